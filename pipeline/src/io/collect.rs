//! Output collection into the fixed output tree.

use std::path::PathBuf;

use tracing::{info, instrument, warn};

use crate::core::location::LocationKey;
use crate::core::types::Warning;
use crate::io::fsops::{StageMode, replace_dir_staged};
use crate::io::layout::WorkspaceLayout;

/// Copy project, scenario and parameter data into `output_root`.
///
/// Each subtree is collected independently and replaces whatever was there.
/// Failures become warnings; the remaining subtrees are still collected.
#[instrument(skip_all, fields(key = %key))]
pub fn collect_outputs(layout: &WorkspaceLayout, key: &LocationKey) -> Vec<Warning> {
    let subtrees: [(&str, PathBuf, PathBuf); 3] = [
        (
            "simulations",
            layout.project_dir(key),
            layout.output_project_dir(key),
        ),
        (
            "scenarios",
            layout.scenario_dir(key),
            layout.output_scenario_dir(key),
        ),
        (
            "parameters",
            layout.parameters_dir.clone(),
            layout.output_parameters_dir(),
        ),
    ];

    let mut warnings = Vec::new();
    for (subtree, source, target) in subtrees {
        let result = if source.is_dir() {
            replace_dir_staged(&source, &target, StageMode::Copy).map_err(|err| err.to_string())
        } else {
            Err(format!("source {} is not a directory", source.display()))
        };
        match result {
            Ok(()) => info!(subtree, target = %target.display(), "output collected"),
            Err(reason) => {
                warn!(subtree, reason = %reason, "output subtree not collected");
                warnings.push(Warning::PartialOutput {
                    subtree: subtree.to_string(),
                    reason,
                });
            }
        }
    }
    warnings
}
