//! Shared deterministic types for pipeline stages.
//!
//! These types are the stable contracts between stages and the run report.
//! They carry no I/O and serialize to a fixed JSON shape.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    LocationKey,
    Acquisition,
    Materialize,
    Simulation,
    Collect,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::LocationKey => "location_key",
            Stage::Acquisition => "acquisition",
            Stage::Materialize => "materialize",
            Stage::Simulation => "simulation",
            Stage::Collect => "collect",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stage status recorded in the run report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    /// The stage completed but some of its units (replicates, subtrees) did not.
    PartialSuccess,
    Failure,
}

/// Outcome of a single stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub message: String,
}

impl RunOutcome {
    pub fn success(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Success,
            message: message.into(),
        }
    }

    pub fn new(stage: Stage, status: StageStatus, message: impl Into<String>) -> Self {
        Self {
            stage,
            status,
            message: message.into(),
        }
    }
}

/// Which environmental data categories the data-preparation collaborator skips.
/// Field names double as the collaborator's keyword arguments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipFlags {
    pub skip_grass_check: bool,
    pub skip_weather: bool,
    pub skip_soil: bool,
    pub skip_management: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicateStatus {
    Succeeded,
    Failed,
}

/// Result of one simulation replicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateOutcome {
    /// 1-indexed replicate identifier.
    pub id: u32,
    /// Directory the replicate writes to; never shared with a sibling.
    pub output_dir: PathBuf,
    pub status: ReplicateStatus,
    pub message: String,
}

impl ReplicateOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == ReplicateStatus::Succeeded
    }
}

/// Recoverable problems that do not change the pipeline verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// An output subtree could not be collected.
    PartialOutput { subtree: String, reason: String },
    /// The collaborator's scratch output could not be removed.
    ScratchCleanup { path: PathBuf, reason: String },
    /// The run report could not be written.
    Report { reason: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::PartialOutput { subtree, reason } => {
                write!(f, "partial output: {subtree} not collected ({reason})")
            }
            Warning::ScratchCleanup { path, reason } => {
                write!(f, "scratch cleanup failed for {} ({reason})", path.display())
            }
            Warning::Report { reason } => write!(f, "run report not written ({reason})"),
        }
    }
}
