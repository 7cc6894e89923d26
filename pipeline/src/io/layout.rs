//! Canonical workspace paths for a run.

use std::path::{Path, PathBuf};

use crate::core::location::LocationKey;
use crate::io::config::PipelineConfig;

/// All directories the pipeline reads or writes, resolved against a base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceLayout {
    pub scratch_dir: PathBuf,
    /// Where the data-preparation collaborator writes one directory per key.
    pub acquisition_root: PathBuf,
    pub scenarios_root: PathBuf,
    pub simulations_root: PathBuf,
    pub parameters_dir: PathBuf,
    pub template_dir: PathBuf,
    pub output_root: PathBuf,
    pub log_dir: PathBuf,
}

impl WorkspaceLayout {
    /// Resolve configured paths; relative ones are taken from `base`.
    pub fn new(base: &Path, cfg: &PipelineConfig) -> Self {
        let resolve = |p: &Path| {
            if p.is_absolute() {
                p.to_path_buf()
            } else {
                base.join(p)
            }
        };
        let scratch_dir = resolve(&cfg.paths.scratch_dir);
        Self {
            acquisition_root: scratch_dir.join(&cfg.data_preparation.output_subdir),
            scratch_dir,
            scenarios_root: resolve(&cfg.paths.scenarios_root),
            simulations_root: resolve(&cfg.paths.simulations_root),
            parameters_dir: resolve(&cfg.paths.parameters_dir),
            template_dir: resolve(&cfg.paths.template_dir),
            output_root: resolve(&cfg.paths.output_root),
            log_dir: resolve(&cfg.paths.log_dir),
        }
    }

    /// Directory the collaborator is expected to create for `key`.
    pub fn acquired_dir(&self, key: &LocationKey) -> PathBuf {
        self.acquisition_root.join(key.as_str())
    }

    pub fn scenario_dir(&self, key: &LocationKey) -> PathBuf {
        self.scenarios_root.join(key.as_str())
    }

    pub fn project_dir(&self, key: &LocationKey) -> PathBuf {
        self.simulations_root.join(key.project_dir_name())
    }

    pub fn output_parameters_dir(&self) -> PathBuf {
        self.output_root.join("parameters")
    }

    pub fn output_scenario_dir(&self, key: &LocationKey) -> PathBuf {
        self.output_root.join("scenarios").join(key.as_str())
    }

    pub fn output_project_dir(&self, key: &LocationKey) -> PathBuf {
        self.output_root
            .join("simulations")
            .join(key.project_dir_name())
    }

    pub fn acquisition_log(&self) -> PathBuf {
        self.log_dir.join("data_preparation.log")
    }

    pub fn report_path(&self, key: &LocationKey) -> PathBuf {
        self.log_dir.join(format!("run_report_{key}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_output_contract() {
        let cfg = PipelineConfig::default();
        let layout = WorkspaceLayout::new(Path::new("/work"), &cfg);
        let key = LocationKey::from_coordinates(51.3919, 11.8787).expect("key");

        assert_eq!(
            layout.acquired_dir(&key),
            PathBuf::from("/work/grasslandModelInputFiles/lat51.391900_lon11.878700")
        );
        assert_eq!(
            layout.project_dir(&key),
            PathBuf::from("/work/simulations/project_lat51.391900_lon11.878700")
        );
        assert_eq!(
            layout.output_project_dir(&key),
            PathBuf::from("/work/output/simulations/project_lat51.391900_lon11.878700")
        );
        assert_eq!(
            layout.output_scenario_dir(&key),
            PathBuf::from("/work/output/scenarios/lat51.391900_lon11.878700")
        );
        assert_eq!(
            layout.output_parameters_dir(),
            PathBuf::from("/work/output/parameters")
        );
    }

    #[test]
    fn absolute_paths_are_kept() {
        let mut cfg = PipelineConfig::default();
        cfg.paths.output_root = PathBuf::from("/data/output");
        let layout = WorkspaceLayout::new(Path::new("/work"), &cfg);
        assert_eq!(layout.output_root, PathBuf::from("/data/output"));
        assert_eq!(layout.log_dir, PathBuf::from("/work/logs"));
    }
}
