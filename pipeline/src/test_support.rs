//! Test-only collaborators and workspace fixtures.
//!
//! Scripted collaborators stand in for the data-preparation package and the
//! simulation model so pipeline behavior can be exercised without either.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use tempfile::TempDir;

use crate::io::acquisition::{AcquisitionRequest, DataPreparer};
use crate::io::config::{PipelineConfig, write_config};
use crate::io::env::{self, EnvSnapshot};
use crate::io::layout::WorkspaceLayout;
use crate::io::simulation::{ReplicateRequest, Simulator};

/// Behavior of a [`ScriptedPreparer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareScript {
    /// Write a small scenario tree under the given directory name.
    Write { dir_name: String },
    /// Report failure without writing anything.
    Fail,
    /// Report success without writing anything.
    Silent,
}

/// Data preparer that follows a script and records every request.
pub struct ScriptedPreparer {
    script: PrepareScript,
    requests: Mutex<Vec<AcquisitionRequest>>,
}

impl ScriptedPreparer {
    pub fn new(script: PrepareScript) -> Self {
        Self {
            script,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Writes `{output_subdir}/{dir_name}/` with weather and soil files.
    pub fn writing(dir_name: &str) -> Self {
        Self::new(PrepareScript::Write {
            dir_name: dir_name.to_string(),
        })
    }

    pub fn failing() -> Self {
        Self::new(PrepareScript::Fail)
    }

    pub fn silent() -> Self {
        Self::new(PrepareScript::Silent)
    }

    pub fn requests(&self) -> Vec<AcquisitionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl DataPreparer for ScriptedPreparer {
    fn prepare(&self, request: &AcquisitionRequest) -> Result<()> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        match &self.script {
            PrepareScript::Write { dir_name } => {
                let dir = request
                    .workdir
                    .join(PipelineConfig::default().data_preparation.output_subdir)
                    .join(dir_name);
                write_file(
                    &dir.join("weather").join(format!(
                        "lat{}_lon{}__weather.txt",
                        request.latitude, request.longitude
                    )),
                    "day\ttemp\n1\t4.2\n",
                )?;
                write_file(&dir.join("soil/soil.txt"), "sand 0.4\n")?;
                Ok(())
            }
            PrepareScript::Fail => bail!("scripted data preparation failure"),
            PrepareScript::Silent => Ok(()),
        }
    }
}

/// Simulator that writes a result file per replicate and fails chosen ids.
pub struct ScriptedSimulator {
    failing: BTreeSet<u32>,
    calls: Mutex<Vec<ReplicateRequest>>,
}

impl ScriptedSimulator {
    pub fn succeeding() -> Self {
        Self::failing_ids([])
    }

    pub fn failing_ids(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            failing: ids.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Recorded requests, sorted by replicate id.
    pub fn calls(&self) -> Vec<ReplicateRequest> {
        let mut calls = self.calls.lock().map(|c| c.clone()).unwrap_or_default();
        calls.sort_by_key(|call| call.id);
        calls
    }
}

impl Simulator for ScriptedSimulator {
    fn run(&self, request: &ReplicateRequest) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        if self.failing.contains(&request.id) {
            bail!("scripted failure for replicate {}", request.id);
        }
        let config = fs::read_to_string(&request.config_file).unwrap_or_default();
        write_file(
            &request.output_dir.join("result.txt"),
            &format!("replicate {}\n{config}", request.id),
        )
    }
}

/// Temporary working directory with templates, parameters and a config.
pub struct TestWorkspace {
    temp: TempDir,
    pub config: PipelineConfig,
}

impl TestWorkspace {
    /// Default config (no credentials required) with both default templates
    /// and a parameters directory.
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let config = PipelineConfig {
            credentials: Vec::new(),
            ..PipelineConfig::default()
        };
        let workspace = Self { temp, config };
        let layout = workspace.layout();
        write_file(
            &layout.template_dir.join("configuration.txt"),
            "latitude = LAT\nlongitude = LON\nsite = deimsId\n\
             weatherFile = latLAT_lonLON__startYear-01-01_endYear-12-31__weather.txt\n",
        )?;
        write_file(
            &layout.template_dir.join("outputWritingDates.txt"),
            "startYear-01-01\nendYear-12-31\n",
        )?;
        write_file(&layout.parameters_dir.join("species.txt"), "PFT1 0.5\n")?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn layout(&self) -> WorkspaceLayout {
        WorkspaceLayout::new(self.temp.path(), &self.config)
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp.path().join("pipeline.toml")
    }

    /// Persist the current config to `pipeline.toml`.
    pub fn write_config(&self) -> Result<PathBuf> {
        let path = self.config_path();
        write_config(&path, &self.config)?;
        Ok(path)
    }

    /// Snapshot with all required parameters for the reference location.
    pub fn env(&self) -> EnvSnapshot {
        EnvSnapshot::from_pairs([
            (env::LAT, "51.3919"),
            (env::LON, "11.8787"),
            (env::START_YEAR, "2017"),
            (env::END_YEAR, "2021"),
        ])
    }

    /// Paths of every file below the workspace root, relative and sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = walkdir::WalkDir::new(self.temp.path())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(self.temp.path())
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect();
        files.sort();
        files
    }
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
