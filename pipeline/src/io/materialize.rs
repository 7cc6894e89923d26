//! Config materialization into the per-location project directory.
//!
//! Each template goes through three explicit stages: copy, rename to its
//! run-specific name, rewrite with substituted values. A failed rename removes
//! the copy; a failed rewrite leaves the renamed, unedited file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::core::location::{LocationKey, format_coordinate};
use crate::core::params::{RunParameters, YearRange};
use crate::core::template::{Substitution, materialized_file_name};
use crate::core::types::Stage;
use crate::error::PipelineError;
use crate::io::config::{ExistingProjectPolicy, TemplateConfig};
use crate::io::fsops::sibling_with_suffix;
use crate::io::layout::WorkspaceLayout;

/// Marker written into every project directory the pipeline creates.
pub const RUN_MARKER: &str = ".pipeline-run.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct RunMarker {
    key: String,
    start_year: i32,
    end_year: i32,
}

impl RunMarker {
    fn years_label(&self) -> String {
        format!("{}-{}", self.start_year, self.end_year)
    }
}

/// Checks that must pass before the run touches scenario data: every
/// template exists, the token set compiles and the project directory may be
/// replaced under `policy`. Writes nothing.
pub fn check_materialization(
    templates: &TemplateConfig,
    policy: ExistingProjectPolicy,
    layout: &WorkspaceLayout,
    params: &RunParameters,
    key: &LocationKey,
) -> Result<(), PipelineError> {
    template_sources(templates, layout)?;
    substitution_for(templates, params)?;
    check_existing_project(&layout.project_dir(key), params.years(), policy)
}

/// Materialize every configured template for this run.
///
/// Returns the materialized files in template order; the first one is the
/// model configuration.
#[instrument(skip_all, fields(key = %key))]
pub fn materialize_config(
    templates: &TemplateConfig,
    policy: ExistingProjectPolicy,
    layout: &WorkspaceLayout,
    params: &RunParameters,
    key: &LocationKey,
) -> Result<Vec<PathBuf>, PipelineError> {
    let sources = template_sources(templates, layout)?;
    let substitution = substitution_for(templates, params)?;
    let years = params.years();
    let project_dir = layout.project_dir(key);
    prepare_project_dir(&project_dir, key, years, policy)?;

    let stem = key.file_stem(years);
    let mut materialized = Vec::with_capacity(sources.len());
    for (name, source) in &sources {
        let path = materialize_one(&substitution, source, &project_dir, &stem, name)?;
        debug!(template = %name, path = %path.display(), "template materialized");
        materialized.push(path);
    }
    info!(
        project_dir = %project_dir.display(),
        files = materialized.len(),
        "configuration materialized"
    );
    Ok(materialized)
}

fn template_sources(
    templates: &TemplateConfig,
    layout: &WorkspaceLayout,
) -> Result<Vec<(String, PathBuf)>, PipelineError> {
    let sources: Vec<(String, PathBuf)> = templates
        .files
        .iter()
        .map(|name| (name.clone(), layout.template_dir.join(name)))
        .collect();
    if let Some((_, path)) = sources.iter().find(|(_, path)| !path.is_file()) {
        return Err(PipelineError::TemplateMissing { path: path.clone() });
    }
    Ok(sources)
}

fn substitution_for(
    templates: &TemplateConfig,
    params: &RunParameters,
) -> Result<Substitution, PipelineError> {
    let years = params.years();
    let site = params
        .site_id()
        .map(str::to_string)
        .unwrap_or_else(|| templates.site_id_fallback.clone());
    let pairs = templates.tokens.with_values(
        format_coordinate(params.latitude()),
        format_coordinate(params.longitude()),
        years.start.to_string(),
        years.end.to_string(),
        site,
    );
    Substitution::new(pairs).map_err(|err| PipelineError::InvalidParameter {
        name: "templates.tokens".to_string(),
        value: String::new(),
        reason: format!("{err:#}"),
    })
}

/// Fail with `ProjectConflict` when `policy` forbids replacing the existing
/// `project_dir` with a run over `years`.
pub fn check_existing_project(
    project_dir: &Path,
    years: YearRange,
    policy: ExistingProjectPolicy,
) -> Result<(), PipelineError> {
    if policy != ExistingProjectPolicy::Reject || !project_dir.exists() {
        return Ok(());
    }
    let existing = read_marker(project_dir);
    let same_years = existing
        .as_ref()
        .is_some_and(|m| m.start_year == years.start && m.end_year == years.end);
    if same_years {
        return Ok(());
    }
    Err(PipelineError::ProjectConflict {
        path: project_dir.to_path_buf(),
        existing: existing
            .map(|m| m.years_label())
            .unwrap_or_else(|| "unknown".to_string()),
        requested: format!("{}-{}", years.start, years.end),
    })
}

/// Make `project_dir` an empty directory owned by this run.
pub fn prepare_project_dir(
    project_dir: &Path,
    key: &LocationKey,
    years: YearRange,
    policy: ExistingProjectPolicy,
) -> Result<(), PipelineError> {
    check_existing_project(project_dir, years, policy)?;
    if project_dir.exists() {
        info!(path = %project_dir.display(), "clearing existing project directory");
        fs::remove_dir_all(project_dir).map_err(|err| {
            PipelineError::workspace(
                Stage::Materialize,
                "clear project dir",
                project_dir,
                err,
            )
        })?;
    }
    fs::create_dir_all(project_dir).map_err(|err| {
        PipelineError::workspace(Stage::Materialize, "create project dir", project_dir, err)
    })?;

    let marker = RunMarker {
        key: key.as_str().to_string(),
        start_year: years.start,
        end_year: years.end,
    };
    let marker_path = project_dir.join(RUN_MARKER);
    let json = serde_json::to_string_pretty(&marker).map_err(std::io::Error::other);
    json.and_then(|json| fs::write(&marker_path, json + "\n"))
        .map_err(|err| {
            PipelineError::workspace(Stage::Materialize, "write run marker", &marker_path, err)
        })
}

fn read_marker(project_dir: &Path) -> Option<RunMarker> {
    let path = project_dir.join(RUN_MARKER);
    let contents = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(marker) => Some(marker),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable run marker");
            None
        }
    }
}

fn materialize_one(
    substitution: &Substitution,
    source: &Path,
    project_dir: &Path,
    stem: &str,
    name: &str,
) -> Result<PathBuf, PipelineError> {
    let copied = project_dir.join(name);
    fs::copy(source, &copied).map_err(|err| {
        PipelineError::workspace(Stage::Materialize, "copy template to", &copied, err)
    })?;

    let file_name = materialized_file_name(stem, name);
    let renamed = project_dir.join(&file_name);
    if let Err(err) = fs::rename(&copied, &renamed) {
        if let Err(cleanup) = fs::remove_file(&copied) {
            warn!(path = %copied.display(), err = %cleanup, "failed to remove template copy");
        }
        return Err(PipelineError::workspace(
            Stage::Materialize,
            "rename template copy to",
            &renamed,
            err,
        ));
    }

    let original = fs::read_to_string(&renamed).map_err(|err| {
        PipelineError::workspace(Stage::Materialize, "read template copy", &renamed, err)
    })?;
    let rendered = substitution.render(&original);
    rewrite_atomic(&renamed, &rendered.text)?;

    let mut tokens = substitution.unresolved_in(&rendered);
    tokens.extend(substitution.unresolved(&file_name));
    tokens.sort();
    tokens.dedup();
    if !tokens.is_empty() {
        return Err(PipelineError::SubstitutionIncomplete {
            file: renamed,
            tokens,
        });
    }
    Ok(renamed)
}

fn rewrite_atomic(path: &Path, contents: &str) -> Result<(), PipelineError> {
    let tmp = sibling_with_suffix(path, ".tmp");
    let result = fs::write(&tmp, contents).and_then(|()| fs::rename(&tmp, path));
    if let Err(err) = result {
        let _ = fs::remove_file(&tmp);
        return Err(PipelineError::workspace(
            Stage::Materialize,
            "rewrite template",
            path,
            err,
        ));
    }
    Ok(())
}
