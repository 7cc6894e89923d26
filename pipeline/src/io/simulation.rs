//! Replicated simulation runs over a bounded worker pool.
//!
//! Replicates are independent: each one owns `project_dir/replicate_{id}` and
//! its own log. A failing or panicking replicate is recorded and its siblings
//! keep running.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::core::types::{ReplicateOutcome, ReplicateStatus};
use crate::core::verdict::{SimulationSummary, classify};
use crate::io::config::SimulationConfig;
use crate::io::process::{run_command_with_timeout, write_command_log};

/// Everything one replicate invocation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicateRequest {
    pub id: u32,
    pub project_dir: PathBuf,
    /// Materialized model configuration.
    pub config_file: PathBuf,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
}

/// Abstraction over the simulation model. Called concurrently from the
/// replicate pool, one call per replicate.
pub trait Simulator: Sync {
    fn run(&self, request: &ReplicateRequest) -> Result<()>;
}

/// Simulator that spawns the configured command once per replicate.
pub struct CommandSimulator {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandSimulator {
    pub fn new(cfg: &SimulationConfig) -> Self {
        Self {
            command: cfg.command.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    /// Command line with `{project_dir}`, `{config_file}`, `{replicate}` and
    /// `{replicate_dir}` expanded.
    pub fn expand(&self, request: &ReplicateRequest) -> Vec<String> {
        let project_dir = request.project_dir.display().to_string();
        let config_file = request.config_file.display().to_string();
        let replicate = request.id.to_string();
        let replicate_dir = request.output_dir.display().to_string();
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{project_dir}", &project_dir)
                    .replace("{config_file}", &config_file)
                    .replace("{replicate_dir}", &replicate_dir)
                    .replace("{replicate}", &replicate)
            })
            .collect()
    }
}

impl Simulator for CommandSimulator {
    fn run(&self, request: &ReplicateRequest) -> Result<()> {
        let argv = self.expand(request);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("simulation command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&request.output_dir);

        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .context("run simulation")?;
        write_command_log(&request.log_path, "simulation", &output)?;
        if let Some(failure) = output.failure() {
            return Err(anyhow!("simulation {failure}"));
        }
        Ok(())
    }
}

/// Replicate layout and concurrency for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationPlan {
    pub project_dir: PathBuf,
    pub config_file: PathBuf,
    pub replicates: u32,
    pub workers: usize,
}

impl SimulationPlan {
    /// `workers` defaults to the available parallelism and is clamped to
    /// `1..=replicates`.
    pub fn new(
        project_dir: PathBuf,
        config_file: PathBuf,
        replicates: u32,
        workers: Option<usize>,
    ) -> Self {
        let requested = workers.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let workers = requested.clamp(1, (replicates as usize).max(1));
        Self {
            project_dir,
            config_file,
            replicates,
            workers,
        }
    }

    pub fn request(&self, id: u32) -> ReplicateRequest {
        let output_dir = replicate_dir(&self.project_dir, id);
        ReplicateRequest {
            id,
            project_dir: self.project_dir.clone(),
            config_file: self.config_file.clone(),
            log_path: output_dir.join("simulation.log"),
            output_dir,
        }
    }
}

pub fn replicate_dir(project_dir: &Path, id: u32) -> PathBuf {
    project_dir.join(format!("replicate_{id}"))
}

/// Outcomes of all replicates, sorted by id, plus their verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationRun {
    pub outcomes: Vec<ReplicateOutcome>,
    pub summary: SimulationSummary,
}

/// Run `plan.replicates` replicates with at most `plan.workers` in flight.
pub fn run_replicates<S: Simulator>(simulator: &S, plan: &SimulationPlan) -> SimulationRun {
    info!(
        replicates = plan.replicates,
        workers = plan.workers,
        "starting simulation replicates"
    );
    let ids = 1..=plan.replicates;
    let mut outcomes: Vec<ReplicateOutcome> =
        match rayon::ThreadPoolBuilder::new().num_threads(plan.workers).build() {
            Ok(pool) => pool.install(|| {
                ids.into_par_iter()
                    .map(|id| run_one(simulator, plan, id))
                    .collect()
            }),
            Err(err) => {
                warn!(err = %err, "failed to build worker pool; running replicates sequentially");
                ids.map(|id| run_one(simulator, plan, id)).collect()
            }
        };
    outcomes.sort_by_key(|outcome| outcome.id);
    let summary = classify(&outcomes);
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "simulation replicates finished"
    );
    SimulationRun { outcomes, summary }
}

fn run_one<S: Simulator>(simulator: &S, plan: &SimulationPlan, id: u32) -> ReplicateOutcome {
    let _span = info_span!("replicate", id).entered();
    let request = plan.request(id);
    debug!(output_dir = %request.output_dir.display(), "starting replicate");

    let result = fs::create_dir_all(&request.output_dir)
        .with_context(|| format!("create replicate dir {}", request.output_dir.display()))
        .and_then(|()| {
            match panic::catch_unwind(AssertUnwindSafe(|| simulator.run(&request))) {
                Ok(result) => result,
                Err(payload) => Err(anyhow!("simulator panicked: {}", panic_message(&*payload))),
            }
        });

    match result {
        Ok(()) => {
            debug!("replicate succeeded");
            ReplicateOutcome {
                id,
                output_dir: request.output_dir,
                status: ReplicateStatus::Succeeded,
                message: String::new(),
            }
        }
        Err(err) => {
            let message = format!("{err:#}");
            warn!(err = %message, "replicate failed");
            ReplicateOutcome {
                id,
                output_dir: request.output_dir,
                status: ReplicateStatus::Failed,
                message,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
