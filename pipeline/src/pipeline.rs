//! Stage orchestration for a single pipeline run.
//!
//! Stages run strictly in order. A fatal error stops the run, is recorded as
//! a `Failure` outcome in the [`PipelineReport`] written to the log directory,
//! and is returned with its stage. Replicate failures and collection problems
//! are recorded in the report without stopping the run.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::core::location::LocationKey;
use crate::core::params::RunParameters;
use crate::core::types::{
    ReplicateOutcome, RunOutcome, SkipFlags, Stage, StageStatus, Warning,
};
use crate::core::verdict::{SimulationSummary, SimulationVerdict};
use crate::error::PipelineError;
use crate::io::acquisition::{AcquisitionRequest, DataPreparer, acquire_data};
use crate::io::collect::collect_outputs;
use crate::io::config::PipelineConfig;
use crate::io::env::{EnvSnapshot, ValidatedInput, validate_preconditions};
use crate::io::layout::WorkspaceLayout;
use crate::io::materialize::{check_materialization, materialize_config};
use crate::io::report::write_report;
use crate::io::simulation::{SimulationPlan, Simulator, run_replicates};

/// Record of a run, written to `log_dir/run_report_{key}.json` whether the
/// run completed or stopped at a fatal error.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub location_key: LocationKey,
    pub parameters: RunParameters,
    pub skip: SkipFlags,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<RunOutcome>,
    /// Absent when the run stopped before the simulation stage.
    pub simulation: Option<SimulationSummary>,
    pub replicates: Vec<ReplicateOutcome>,
    pub warnings: Vec<Warning>,
    /// The fatal error that stopped the run.
    pub error: Option<String>,
}

impl PipelineReport {
    pub fn verdict(&self) -> Option<SimulationVerdict> {
        self.simulation.as_ref().map(|summary| summary.verdict)
    }
}

/// Report under construction while the stages run.
struct RunRecord {
    started_at: DateTime<Utc>,
    outcomes: Vec<RunOutcome>,
    simulation: Option<SimulationSummary>,
    replicates: Vec<ReplicateOutcome>,
    warnings: Vec<Warning>,
}

impl RunRecord {
    fn finish(
        self,
        key: LocationKey,
        input: &ValidatedInput,
        error: Option<String>,
    ) -> PipelineReport {
        PipelineReport {
            location_key: key,
            parameters: input.params.clone(),
            skip: input.skip,
            started_at: self.started_at,
            finished_at: Utc::now(),
            outcomes: self.outcomes,
            simulation: self.simulation,
            replicates: self.replicates,
            warnings: self.warnings,
            error,
        }
    }
}

/// Validate `env` and run the pipeline with paths resolved against `base_dir`.
///
/// Nothing is created on disk when validation fails.
pub fn execute<P: DataPreparer, S: Simulator>(
    env: &EnvSnapshot,
    config: &PipelineConfig,
    base_dir: &Path,
    preparer: &P,
    simulator: &S,
) -> Result<PipelineReport, PipelineError> {
    let input = validate_preconditions(env, &config.credentials)?;
    let layout = WorkspaceLayout::new(base_dir, config);
    run_pipeline(&input, config, &layout, preparer, simulator)
}

/// Run stages 2 through 6 for already validated input.
///
/// Once the location key is known, a report is written for every outcome,
/// including a fatal error in a later stage.
#[instrument(skip_all, fields(start_year = input.params.years().start, end_year = input.params.years().end))]
pub fn run_pipeline<P: DataPreparer, S: Simulator>(
    input: &ValidatedInput,
    config: &PipelineConfig,
    layout: &WorkspaceLayout,
    preparer: &P,
    simulator: &S,
) -> Result<PipelineReport, PipelineError> {
    let mut record = RunRecord {
        started_at: Utc::now(),
        outcomes: vec![RunOutcome::success(
            Stage::Validate,
            "required parameters and credentials present",
        )],
        simulation: None,
        replicates: Vec::new(),
        warnings: Vec::new(),
    };

    let key = LocationKey::derive(&input.params)?;
    info!(key = %key, "location key derived");
    record
        .outcomes
        .push(RunOutcome::success(Stage::LocationKey, key.as_str()));

    match run_stages(&mut record, input, config, layout, &key, preparer, simulator) {
        Ok(()) => {
            let report = persist(record.finish(key, input, None), layout);
            info!(
                key = %report.location_key,
                verdict = ?report.verdict(),
                warnings = report.warnings.len(),
                "pipeline finished"
            );
            Ok(report)
        }
        Err(err) => {
            let message = err.to_string();
            warn!(stage = %err.stage(), err = %message, "pipeline stopped");
            record
                .outcomes
                .push(RunOutcome::new(err.stage(), StageStatus::Failure, message.clone()));
            persist(record.finish(key, input, Some(message)), layout);
            Err(err)
        }
    }
}

fn run_stages<P: DataPreparer, S: Simulator>(
    record: &mut RunRecord,
    input: &ValidatedInput,
    config: &PipelineConfig,
    layout: &WorkspaceLayout,
    key: &LocationKey,
    preparer: &P,
    simulator: &S,
) -> Result<(), PipelineError> {
    check_materialization(
        &config.templates,
        config.existing_project,
        layout,
        &input.params,
        key,
    )?;

    let request =
        AcquisitionRequest::new(&input.params, input.skip, layout, &config.data_preparation);
    let acquisition = acquire_data(preparer, &request, layout, key)?;
    record.outcomes.push(RunOutcome::success(
        Stage::Acquisition,
        format!("scenario data in {}", acquisition.scenario_dir.display()),
    ));
    record.warnings.extend(acquisition.warnings);

    let files = materialize_config(
        &config.templates,
        config.existing_project,
        layout,
        &input.params,
        key,
    )?;
    let Some(config_file) = files.first().cloned() else {
        return Err(PipelineError::TemplateMissing {
            path: layout.template_dir.clone(),
        });
    };
    record.outcomes.push(RunOutcome::success(
        Stage::Materialize,
        format!("{} files materialized", files.len()),
    ));

    let plan = SimulationPlan::new(
        layout.project_dir(key),
        config_file,
        config.simulation.replicates,
        config.simulation.workers,
    );
    let run = run_replicates(simulator, &plan);
    let summary = run.summary;
    record.simulation = Some(summary);
    record.replicates = run.outcomes;
    if summary.verdict == SimulationVerdict::Failure {
        return Err(PipelineError::SimulationFailed {
            total: summary.total,
        });
    }
    record.outcomes.push(RunOutcome::new(
        Stage::Simulation,
        summary.verdict.stage_status(),
        format!("{}/{} replicates succeeded", summary.succeeded, summary.total),
    ));

    let collect_warnings = collect_outputs(layout, key);
    let collect_status = if collect_warnings.is_empty() {
        StageStatus::Success
    } else {
        StageStatus::PartialSuccess
    };
    record.outcomes.push(RunOutcome::new(
        Stage::Collect,
        collect_status,
        format!("outputs in {}", layout.output_root.display()),
    ));
    record.warnings.extend(collect_warnings);
    Ok(())
}

/// Write `report`; a write failure is added to its warnings.
fn persist(mut report: PipelineReport, layout: &WorkspaceLayout) -> PipelineReport {
    let report_path = layout.report_path(&report.location_key);
    if let Err(err) = write_report(&report_path, &report) {
        let reason = format!("{err:#}");
        warn!(path = %report_path.display(), reason = %reason, "failed to write run report");
        report.warnings.push(Warning::Report { reason });
    }
    report
}
