//! Data acquisition through the external data-preparation collaborator.
//!
//! The [`DataPreparer`] trait decouples the pipeline from the actual
//! collaborator (the `ucgrassland` Python package). Tests use scripted
//! preparers that write a directory tree without spawning processes.
//!
//! The command collaborator receives one argument: a JSON object whose keys
//! are the keyword arguments of `prep_grassland_model_input_data`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::location::{LocationKey, format_coordinate};
use crate::core::params::{RunParameters, YearRange};
use crate::core::types::{SkipFlags, Stage, Warning};
use crate::error::PipelineError;
use crate::io::config::DataPreparationConfig;
use crate::io::fsops::{StageMode, remove_if_exists, replace_dir_staged};
use crate::io::layout::WorkspaceLayout;
use crate::io::process::{run_command_with_timeout, write_command_log};

/// Parameters for one data-preparation invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    /// Latitude as rendered in the location key.
    pub latitude: String,
    /// Longitude as rendered in the location key.
    pub longitude: String,
    pub years: YearRange,
    pub site_id: Option<String>,
    pub skip: SkipFlags,
    /// Working directory of the collaborator.
    pub workdir: PathBuf,
    pub log_path: PathBuf,
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl AcquisitionRequest {
    pub fn new(
        params: &RunParameters,
        skip: SkipFlags,
        layout: &WorkspaceLayout,
        cfg: &DataPreparationConfig,
    ) -> Self {
        Self {
            latitude: format_coordinate(params.latitude()),
            longitude: format_coordinate(params.longitude()),
            years: params.years(),
            site_id: params.site_id().map(str::to_string),
            skip,
            workdir: layout.scratch_dir.clone(),
            log_path: layout.acquisition_log(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
        }
    }

    /// Keyword arguments for `prep_grassland_model_input_data`.
    ///
    /// Coordinates are the key-formatted values, so the collaborator names
    /// its output directory exactly like the location key.
    pub fn call(&self) -> Result<PrepareCall<'_>> {
        let lat = parse_coordinate("latitude", &self.latitude)?;
        let lon = parse_coordinate("longitude", &self.longitude)?;
        Ok(PrepareCall {
            coordinates_list: [Coordinates { lat, lon }],
            first_year: self.years.start,
            last_year: self.years.end,
            deims_id: self.site_id.as_deref(),
            skip: self.skip,
        })
    }

    /// Arguments appended after the configured command: the JSON-encoded call.
    pub fn args(&self) -> Result<Vec<String>> {
        let call = serde_json::to_string(&self.call()?).context("encode data preparation call")?;
        Ok(vec![call])
    }
}

fn parse_coordinate(axis: &str, value: &str) -> Result<f64> {
    value
        .parse::<f64>()
        .with_context(|| format!("{axis} {value:?} is not a number"))
}

/// Keyword arguments of one `prep_grassland_model_input_data` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepareCall<'a> {
    pub coordinates_list: [Coordinates; 1],
    pub first_year: i32,
    pub last_year: i32,
    pub deims_id: Option<&'a str>,
    #[serde(flatten)]
    pub skip: SkipFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Abstraction over the data-preparation collaborator.
pub trait DataPreparer {
    /// Produce `<workdir>/<output_subdir>/<location key>/`. Must return an error
    /// when the collaborator fails.
    fn prepare(&self, request: &AcquisitionRequest) -> Result<()>;
}

/// Preparer that spawns the configured command.
pub struct CommandDataPreparer {
    command: Vec<String>,
}

impl CommandDataPreparer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl DataPreparer for CommandDataPreparer {
    #[instrument(skip_all, fields(timeout_secs = request.timeout.as_secs()))]
    fn prepare(&self, request: &AcquisitionRequest) -> Result<()> {
        let (program, leading) = self
            .command
            .split_first()
            .ok_or_else(|| anyhow!("data preparation command is empty"))?;
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .args(request.args()?)
            .current_dir(&request.workdir);
        info!(program = %program, workdir = %request.workdir.display(), "starting data preparation");

        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .context("run data preparation")?;
        write_command_log(&request.log_path, "data preparation", &output)?;

        if let Some(failure) = output.failure() {
            warn!(exit_code = ?output.status.code(), failure = %failure, "data preparation failed");
            return Err(anyhow!(
                "data preparation {failure} (log: {})",
                request.log_path.display()
            ));
        }
        debug!("data preparation completed successfully");
        Ok(())
    }
}

/// Acquired scenario data and any cleanup warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub scenario_dir: PathBuf,
    pub warnings: Vec<Warning>,
}

/// Run the collaborator and stage its output into the scenario workspace.
///
/// Any stale output for `key` in the scratch tree is removed first, so a
/// leftover from an earlier run can never satisfy the layout check.
#[instrument(skip_all, fields(key = %key))]
pub fn acquire_data<P: DataPreparer>(
    preparer: &P,
    request: &AcquisitionRequest,
    layout: &WorkspaceLayout,
    key: &LocationKey,
) -> Result<Acquisition, PipelineError> {
    fs::create_dir_all(&layout.scratch_dir).map_err(|err| {
        PipelineError::workspace(
            Stage::Acquisition,
            "create scratch dir",
            &layout.scratch_dir,
            err,
        )
    })?;
    let expected = layout.acquired_dir(key);
    remove_if_exists(&expected).map_err(|err| {
        PipelineError::workspace(
            Stage::Acquisition,
            "remove stale acquisition output",
            &expected,
            err,
        )
    })?;

    preparer
        .prepare(request)
        .map_err(|err| PipelineError::AcquisitionFailed {
            reason: format!("{err:#}"),
        })?;

    if !expected.is_dir() {
        warn!(
            expected = %expected.display(),
            found = ?list_dir_names(&layout.acquisition_root),
            "expected location directory missing after data preparation"
        );
        return Err(PipelineError::LayoutMismatch { expected });
    }

    let scenario_dir = layout.scenario_dir(key);
    replace_dir_staged(&expected, &scenario_dir, StageMode::Move).map_err(|err| {
        PipelineError::workspace(
            Stage::Acquisition,
            "stage scenario data into",
            &scenario_dir,
            err,
        )
    })?;
    info!(scenario_dir = %scenario_dir.display(), "scenario data staged");

    let mut warnings = Vec::new();
    if let Err(err) = remove_if_exists(&layout.acquisition_root) {
        warn!(path = %layout.acquisition_root.display(), err = %err, "failed to remove scratch output");
        warnings.push(Warning::ScratchCleanup {
            path: layout.acquisition_root.clone(),
            reason: err.to_string(),
        });
    }

    Ok(Acquisition {
        scenario_dir,
        warnings,
    })
}

fn list_dir_names(dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::PipelineConfig;
    use crate::test_support::ScriptedPreparer;

    struct Fixture {
        _temp: tempfile::TempDir,
        layout: WorkspaceLayout,
        key: LocationKey,
        request: AcquisitionRequest,
    }

    fn fixture(site_id: Option<&str>, skip: SkipFlags) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut cfg = PipelineConfig::default();
        cfg.paths.scratch_dir = PathBuf::from("scratch");
        let layout = WorkspaceLayout::new(temp.path(), &cfg);
        let params =
            RunParameters::new(51.3919, 11.8787, 2017, 2021, site_id.map(str::to_string))
                .expect("params");
        let key = LocationKey::derive(&params).expect("key");
        let request = AcquisitionRequest::new(&params, skip, &layout, &cfg.data_preparation);
        Fixture {
            _temp: temp,
            layout,
            key,
            request,
        }
    }

    #[test]
    fn call_uses_key_formatting_and_skip_flags() {
        let skip = SkipFlags {
            skip_soil: true,
            ..SkipFlags::default()
        };
        let f = fixture(Some("site-1"), skip);
        let args = f.request.args().expect("args");
        assert_eq!(args.len(), 1);
        let call: serde_json::Value = serde_json::from_str(&args[0]).expect("json");
        assert_eq!(
            call,
            serde_json::json!({
                "coordinates_list": [{"lat": 51.3919, "lon": 11.8787}],
                "first_year": 2017,
                "last_year": 2021,
                "deims_id": "site-1",
                "skip_grass_check": false,
                "skip_weather": false,
                "skip_soil": true,
                "skip_management": false,
            })
        );
    }

    #[test]
    fn call_coordinates_are_rounded_like_the_key() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = PipelineConfig::default();
        let layout = WorkspaceLayout::new(temp.path(), &cfg);
        let params = RunParameters::new(-0.0000004, 7.12345678, 2017, 2017, None).expect("params");
        let request =
            AcquisitionRequest::new(&params, SkipFlags::default(), &layout, &cfg.data_preparation);
        let call = request.call().expect("call");
        let [coordinates] = call.coordinates_list;
        assert_eq!(format!("{:.6}", coordinates.lat), "0.000000");
        assert_eq!(format!("{:.6}", coordinates.lon), "7.123457");
        assert!(coordinates.lat.is_sign_positive());
        assert_eq!(call.deims_id, None);
    }

    #[test]
    fn call_keys_match_collaborator_keyword_arguments() {
        let f = fixture(Some("site-1"), SkipFlags::default());
        let args = f.request.args().expect("args");
        let call: serde_json::Value = serde_json::from_str(&args[0]).expect("json");
        let mut keys: Vec<&str> = call
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "coordinates_list",
                "deims_id",
                "first_year",
                "last_year",
                "skip_grass_check",
                "skip_management",
                "skip_soil",
                "skip_weather",
            ]
        );
    }

    #[test]
    fn default_command_calls_the_python_function() {
        let command = PipelineConfig::default().data_preparation.command;
        assert_eq!(command[..2], ["python3", "-c"]);
        let entry = &command[2];
        assert!(entry.contains(
            "from ucgrassland.prep_grassland_model_input_data import prep_grassland_model_input_data"
        ));
        assert!(entry.contains("prep_grassland_model_input_data(**json.loads(sys.argv[1]))"));
        assert!(command.iter().all(|arg| !arg.starts_with("--")));
    }

    #[test]
    fn stages_output_and_removes_scratch_tree() {
        let f = fixture(None, SkipFlags::default());
        let preparer = ScriptedPreparer::writing(f.key.as_str());

        let acquisition = acquire_data(&preparer, &f.request, &f.layout, &f.key).expect("acquire");
        assert_eq!(acquisition.scenario_dir, f.layout.scenario_dir(&f.key));
        assert!(acquisition.scenario_dir.join("weather").is_dir());
        assert!(!f.layout.acquisition_root.exists());
        assert!(acquisition.warnings.is_empty());
        assert_eq!(preparer.requests().len(), 1);
    }

    #[test]
    fn collaborator_failure_is_acquisition_failed() {
        let f = fixture(None, SkipFlags::default());
        let err = acquire_data(&ScriptedPreparer::failing(), &f.request, &f.layout, &f.key)
            .unwrap_err();
        assert!(matches!(err, PipelineError::AcquisitionFailed { .. }));
        assert!(!f.layout.scenario_dir(&f.key).exists());
    }

    #[test]
    fn missing_location_dir_is_layout_mismatch() {
        let f = fixture(None, SkipFlags::default());
        let preparer = ScriptedPreparer::writing("lat51.3919_lon11.8787");

        let err = acquire_data(&preparer, &f.request, &f.layout, &f.key).unwrap_err();
        match err {
            PipelineError::LayoutMismatch { expected } => {
                assert_eq!(expected, f.layout.acquired_dir(&f.key));
            }
            other => panic!("expected LayoutMismatch, got {other:?}"),
        }
        assert!(!f.layout.scenario_dir(&f.key).exists());
    }

    #[test]
    fn stale_scratch_output_does_not_mask_mismatch() {
        let f = fixture(None, SkipFlags::default());
        fs::create_dir_all(f.layout.acquired_dir(&f.key)).expect("stale dir");

        let err =
            acquire_data(&ScriptedPreparer::silent(), &f.request, &f.layout, &f.key).unwrap_err();
        assert!(matches!(err, PipelineError::LayoutMismatch { .. }));
    }

    #[test]
    fn previous_scenario_data_is_replaced() {
        let f = fixture(None, SkipFlags::default());
        let stale = f.layout.scenario_dir(&f.key).join("old.txt");
        fs::create_dir_all(stale.parent().expect("parent")).expect("mkdir");
        fs::write(&stale, "old").expect("write");

        let preparer = ScriptedPreparer::writing(f.key.as_str());
        acquire_data(&preparer, &f.request, &f.layout, &f.key).expect("acquire");
        assert!(!stale.exists());
    }

    #[cfg(unix)]
    #[test]
    fn command_preparer_reports_nonzero_exit() {
        let f = fixture(None, SkipFlags::default());
        let preparer = CommandDataPreparer::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo failing >&2; exit 7".to_string(),
        ]);
        let err = acquire_data(&preparer, &f.request, &f.layout, &f.key).unwrap_err();
        match err {
            PipelineError::AcquisitionFailed { reason } => {
                assert!(reason.contains("exited with status 7"), "{reason}");
            }
            other => panic!("expected AcquisitionFailed, got {other:?}"),
        }
        let log = fs::read_to_string(f.layout.acquisition_log()).expect("log");
        assert!(log.contains("failing"));
    }
}
