//! Pipeline configuration stored in `pipeline.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::template::{Substitution, TokenValue};

/// Pipeline configuration (TOML).
///
/// Intended to be edited by humans. Missing fields default to the layout the
/// container image ships with. Relative paths resolve against the working
/// directory of the run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Environment variables that must hold data-service credentials.
    pub credentials: Vec<String>,

    /// What to do when the project directory already exists.
    pub existing_project: ExistingProjectPolicy,

    pub paths: PathsConfig,
    pub data_preparation: DataPreparationConfig,
    pub templates: TemplateConfig,
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExistingProjectPolicy {
    /// Remove the previous project directory and start fresh.
    #[default]
    Clear,
    /// Refuse when the previous project covers a different year range.
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    /// Working directory of the data-preparation command.
    pub scratch_dir: PathBuf,
    pub scenarios_root: PathBuf,
    pub simulations_root: PathBuf,
    pub parameters_dir: PathBuf,
    pub template_dir: PathBuf,
    pub output_root: PathBuf,
    /// Collaborator logs and run reports.
    pub log_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: PathBuf::from("."),
            scenarios_root: PathBuf::from("scenarios"),
            simulations_root: PathBuf::from("simulations"),
            parameters_dir: PathBuf::from("parameters"),
            template_dir: PathBuf::from("templates"),
            output_root: PathBuf::from("output"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

/// Calls `prep_grassland_model_input_data` with the keyword arguments decoded
/// from the first command-line argument.
pub const PREPARE_ENTRY: &str = "import json, sys\n\
from ucgrassland.prep_grassland_model_input_data import prep_grassland_model_input_data\n\
prep_grassland_model_input_data(**json.loads(sys.argv[1]))\n";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataPreparationConfig {
    /// Program and leading arguments. The JSON-encoded call is appended as the
    /// last argument.
    pub command: Vec<String>,
    /// Directory under `scratch_dir` holding one subdirectory per location key.
    pub output_subdir: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for DataPreparationConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-c".to_string(),
                PREPARE_ENTRY.to_string(),
            ],
            output_subdir: "grasslandModelInputFiles".to_string(),
            timeout_secs: 6 * 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TemplateConfig {
    /// Template file names in `template_dir`. The first one is the model
    /// configuration passed to the simulation as `{config_file}`.
    pub files: Vec<String>,
    pub tokens: TokenConfig,
    /// Value for the site token when no site identifier is given.
    pub site_id_fallback: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            files: vec![
                "configuration.txt".to_string(),
                "outputWritingDates.txt".to_string(),
            ],
            tokens: TokenConfig::default(),
            site_id_fallback: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenConfig {
    pub latitude: String,
    pub longitude: String,
    pub start_year: String,
    pub end_year: String,
    pub site_id: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            latitude: "LAT".to_string(),
            longitude: "LON".to_string(),
            start_year: "startYear".to_string(),
            end_year: "endYear".to_string(),
            site_id: "deimsId".to_string(),
        }
    }
}

impl TokenConfig {
    /// Pair each configured token with its value.
    pub fn with_values(
        &self,
        latitude: String,
        longitude: String,
        start_year: String,
        end_year: String,
        site_id: String,
    ) -> Vec<TokenValue> {
        [
            (&self.latitude, latitude),
            (&self.longitude, longitude),
            (&self.start_year, start_year),
            (&self.end_year, end_year),
            (&self.site_id, site_id),
        ]
        .into_iter()
        .map(|(token, value)| TokenValue {
            token: token.clone(),
            value,
        })
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Program and arguments. `{project_dir}`, `{config_file}`, `{replicate}`
    /// and `{replicate_dir}` are expanded per replicate.
    pub command: Vec<String>,
    /// Number of replicates when the caller does not choose one.
    pub replicates: u32,
    /// Concurrent replicates. Defaults to the available parallelism.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "grassmind".to_string(),
                "{config_file}".to_string(),
                "{replicate_dir}".to_string(),
            ],
            replicates: 1,
            workers: None,
            timeout_secs: 12 * 60 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            credentials: vec!["HDA_USER".to_string(), "HDA_PASSWORD".to_string()],
            existing_project: ExistingProjectPolicy::default(),
            paths: PathsConfig::default(),
            data_preparation: DataPreparationConfig::default(),
            templates: TemplateConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.credentials.iter().any(|name| name.trim().is_empty()) {
            return Err(anyhow!("credentials must not contain empty names"));
        }
        ensure_command("data_preparation.command", &self.data_preparation.command)?;
        if self.data_preparation.output_subdir.trim().is_empty() {
            return Err(anyhow!("data_preparation.output_subdir must be non-empty"));
        }
        if self.data_preparation.timeout_secs == 0 {
            return Err(anyhow!("data_preparation.timeout_secs must be > 0"));
        }
        if self.data_preparation.output_limit_bytes == 0 {
            return Err(anyhow!("data_preparation.output_limit_bytes must be > 0"));
        }
        if self.templates.files.is_empty() {
            return Err(anyhow!("templates.files must be a non-empty array"));
        }
        if let Some(name) = self
            .templates
            .files
            .iter()
            .find(|name| name.trim().is_empty() || name.contains(['/', '\\']))
        {
            return Err(anyhow!("templates.files entry {name:?} must be a bare file name"));
        }
        let tokens = self.templates.tokens.with_values(
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        );
        Substitution::new(tokens).context("templates.tokens")?;
        ensure_command("simulation.command", &self.simulation.command)?;
        if self.simulation.replicates == 0 {
            return Err(anyhow!("simulation.replicates must be > 0"));
        }
        if self.simulation.workers == Some(0) {
            return Err(anyhow!("simulation.workers must be > 0"));
        }
        if self.simulation.timeout_secs == 0 {
            return Err(anyhow!("simulation.timeout_secs must be > 0"));
        }
        if self.simulation.output_limit_bytes == 0 {
            return Err(anyhow!("simulation.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

fn ensure_command(field: &str, command: &[String]) -> Result<()> {
    if command.is_empty() || command[0].trim().is_empty() {
        return Err(anyhow!("{field} must be a non-empty array"));
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    super::fsops::write_atomic(path, &buf)
}
