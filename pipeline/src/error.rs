//! Stage error taxonomy.
//!
//! Every fatal error names the stage it belongs to and the concrete
//! precondition that failed. Per-replicate failures and output warnings are
//! not errors; they live in [`crate::core::types`].

use std::path::PathBuf;

use thiserror::Error;

use crate::core::types::Stage;
use crate::exit_codes;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required parameter {name}")]
    MissingParameter { name: String },

    #[error("invalid parameter {name}={value:?}: {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("missing credential {name}")]
    MissingCredential { name: String },

    #[error("invalid coordinate {axis}={value}: {reason}")]
    InvalidCoordinate {
        axis: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("data acquisition failed: {reason}")]
    AcquisitionFailed { reason: String },

    #[error(
        "data preparation reported success but expected directory {} is missing",
        .expected.display()
    )]
    LayoutMismatch { expected: PathBuf },

    #[error(
        "project directory {} holds years {existing}, refusing to replace with {requested}",
        .path.display()
    )]
    ProjectConflict {
        path: PathBuf,
        existing: String,
        requested: String,
    },

    #[error("template {} not found", .path.display())]
    TemplateMissing { path: PathBuf },

    #[error("unresolved placeholders {tokens:?} in {}", .file.display())]
    SubstitutionIncomplete { file: PathBuf, tokens: Vec<String> },

    #[error("{stage}: {action} {}", .path.display())]
    Workspace {
        stage: Stage,
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("all {total} simulation replicates failed")]
    SimulationFailed { total: u32 },
}

impl PipelineError {
    pub fn workspace(
        stage: Stage,
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        PipelineError::Workspace {
            stage,
            action,
            path: path.into(),
            source,
        }
    }

    /// Stage the error aborted.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::MissingParameter { .. }
            | PipelineError::InvalidParameter { .. }
            | PipelineError::MissingCredential { .. }
            | PipelineError::InvalidCoordinate { .. } => Stage::Validate,
            PipelineError::AcquisitionFailed { .. } | PipelineError::LayoutMismatch { .. } => {
                Stage::Acquisition
            }
            PipelineError::ProjectConflict { .. }
            | PipelineError::TemplateMissing { .. }
            | PipelineError::SubstitutionIncomplete { .. } => Stage::Materialize,
            PipelineError::Workspace { stage, .. } => *stage,
            PipelineError::SimulationFailed { .. } => Stage::Simulation,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self.stage() {
            Stage::Validate | Stage::LocationKey => exit_codes::PRECONDITION,
            Stage::Acquisition => exit_codes::ACQUISITION,
            Stage::Materialize => exit_codes::TEMPLATING,
            Stage::Simulation => exit_codes::SIMULATION,
            Stage::Collect => exit_codes::INVALID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_stages() {
        let missing = PipelineError::MissingParameter {
            name: "LAT".to_string(),
        };
        let acquisition = PipelineError::AcquisitionFailed {
            reason: "exit 1".to_string(),
        };
        let layout = PipelineError::LayoutMismatch {
            expected: PathBuf::from("x"),
        };
        let template = PipelineError::TemplateMissing {
            path: PathBuf::from("t"),
        };
        let simulation = PipelineError::SimulationFailed { total: 3 };

        assert_eq!(missing.exit_code(), exit_codes::PRECONDITION);
        assert_eq!(acquisition.exit_code(), exit_codes::ACQUISITION);
        assert_eq!(layout.exit_code(), exit_codes::ACQUISITION);
        assert_eq!(template.exit_code(), exit_codes::TEMPLATING);
        assert_eq!(simulation.exit_code(), exit_codes::SIMULATION);
    }

    #[test]
    fn workspace_error_reports_its_stage() {
        let err = PipelineError::workspace(
            Stage::Acquisition,
            "create scratch dir",
            "/tmp/scratch",
            std::io::Error::other("denied"),
        );
        assert_eq!(err.stage(), Stage::Acquisition);
        assert_eq!(err.to_string(), "acquisition: create scratch dir /tmp/scratch");
    }
}
