//! Aggregation of replicate outcomes into a simulation verdict.

use serde::Serialize;

use crate::core::types::{ReplicateOutcome, StageStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum SimulationVerdict {
    Success,
    PartialSuccess { failed: u32 },
    Failure,
}

impl SimulationVerdict {
    pub fn stage_status(self) -> StageStatus {
        match self {
            SimulationVerdict::Success => StageStatus::Success,
            SimulationVerdict::PartialSuccess { .. } => StageStatus::PartialSuccess,
            SimulationVerdict::Failure => StageStatus::Failure,
        }
    }
}

/// Counts and verdict over all replicates of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimulationSummary {
    pub total: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub verdict: SimulationVerdict,
}

/// Classify replicate outcomes.
///
/// Zero successes (including zero replicates) is a failure; any success with
/// at least one failure is a partial success.
pub fn classify(outcomes: &[ReplicateOutcome]) -> SimulationSummary {
    let total = outcomes.len() as u32;
    let succeeded = outcomes.iter().filter(|o| o.succeeded()).count() as u32;
    let failed = total - succeeded;
    let verdict = match (succeeded, failed) {
        (0, _) => SimulationVerdict::Failure,
        (_, 0) => SimulationVerdict::Success,
        (_, failed) => SimulationVerdict::PartialSuccess { failed },
    };
    SimulationSummary {
        total,
        succeeded,
        failed,
        verdict,
    }
}
