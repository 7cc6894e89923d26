//! Precondition validation over an explicit environment snapshot.
//!
//! The process environment is read exactly once, into an [`EnvSnapshot`].
//! Validation turns that snapshot into run parameters without touching the
//! filesystem or spawning anything, so a run that cannot complete never leaves
//! a partial workspace behind.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::str::FromStr;

use tracing::debug;

use crate::core::params::RunParameters;
use crate::core::types::SkipFlags;
use crate::error::PipelineError;

pub const LAT: &str = "LAT";
pub const LON: &str = "LON";
pub const START_YEAR: &str = "START_YEAR";
pub const END_YEAR: &str = "END_YEAR";
pub const SITE_ID: &str = "DEIMS_ID";
pub const SKIP_GRASS_CHECK: &str = "SKIP_GRASS_CHECK";
pub const SKIP_WEATHER: &str = "SKIP_WEATHER";
pub const SKIP_SOIL: &str = "SKIP_SOIL";
pub const SKIP_MANAGEMENT: &str = "SKIP_MANAGEMENT";

/// Immutable view of the variables a run depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
    /// Variables whose value is not valid UTF-8, with a lossy rendering.
    non_utf8: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    /// Build a snapshot from raw OS pairs. Values that are not valid UTF-8 are
    /// remembered so validation can reject them by name; entries whose name is
    /// not valid UTF-8 are ignored.
    pub fn from_os_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut snapshot = Self::default();
        for (key, value) in pairs {
            let Ok(key) = key.into_string() else {
                continue;
            };
            match value.into_string() {
                Ok(value) => {
                    snapshot.vars.insert(key, value);
                }
                Err(raw) => {
                    snapshot
                        .non_utf8
                        .insert(key, raw.to_string_lossy().into_owned());
                }
            }
        }
        snapshot
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            non_utf8: BTreeMap::new(),
        }
    }

    /// Layer an explicit value (e.g. a CLI flag) over the captured one.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.non_utf8.remove(key);
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Trimmed value, or `None` when unset or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Like [`EnvSnapshot::get`], but a value that is not valid UTF-8 is an
    /// `InvalidParameter` rather than absent.
    pub fn lookup(&self, key: &str) -> Result<Option<&str>, PipelineError> {
        if let Some(lossy) = self.non_utf8.get(key) {
            return Err(PipelineError::InvalidParameter {
                name: key.to_string(),
                value: lossy.clone(),
                reason: "value is not valid UTF-8".to_string(),
            });
        }
        Ok(self.get(key))
    }
}

/// Everything the pipeline needs from the environment, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedInput {
    pub params: RunParameters,
    pub skip: SkipFlags,
}

/// Check required parameters and credentials and build [`RunParameters`].
///
/// Missing parameters are reported in the order LAT, LON, START_YEAR,
/// END_YEAR, before any value is parsed. Credentials are only checked for
/// presence; their values are never logged or kept.
pub fn validate_preconditions(
    env: &EnvSnapshot,
    credentials: &[String],
) -> Result<ValidatedInput, PipelineError> {
    let lat = require(env, LAT)?;
    let lon = require(env, LON)?;
    let start = require(env, START_YEAR)?;
    let end = require(env, END_YEAR)?;

    for name in credentials {
        if env.lookup(name)?.is_none() {
            return Err(PipelineError::MissingCredential { name: name.clone() });
        }
    }

    let params = RunParameters::new(
        parse(LAT, lat)?,
        parse(LON, lon)?,
        parse(START_YEAR, start)?,
        parse(END_YEAR, end)?,
        env.lookup(SITE_ID)?.map(str::to_string),
    )?;
    let skip = SkipFlags {
        skip_grass_check: flag(env, SKIP_GRASS_CHECK)?,
        skip_weather: flag(env, SKIP_WEATHER)?,
        skip_soil: flag(env, SKIP_SOIL)?,
        skip_management: flag(env, SKIP_MANAGEMENT)?,
    };
    debug!(
        latitude = params.latitude(),
        longitude = params.longitude(),
        start_year = params.years().start,
        end_year = params.years().end,
        site_id = ?params.site_id(),
        ?skip,
        "preconditions satisfied"
    );
    Ok(ValidatedInput { params, skip })
}

fn require<'a>(env: &'a EnvSnapshot, name: &str) -> Result<&'a str, PipelineError> {
    env.lookup(name)?
        .ok_or_else(|| PipelineError::MissingParameter {
            name: name.to_string(),
        })
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T, PipelineError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|err| PipelineError::InvalidParameter {
        name: name.to_string(),
        value: raw.to_string(),
        reason: err.to_string(),
    })
}

fn flag(env: &EnvSnapshot, name: &str) -> Result<bool, PipelineError> {
    let Some(raw) = env.lookup(name)? else {
        return Ok(false);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(PipelineError::InvalidParameter {
            name: name.to_string(),
            value: raw.to_string(),
            reason: "expected a boolean (true/false, 1/0, yes/no, on/off)".to_string(),
        }),
    }
}
