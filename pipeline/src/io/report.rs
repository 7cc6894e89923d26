//! Run report persistence.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::io::fsops::write_atomic;

/// Atomically write `report` as pretty JSON.
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(report).context("serialize run report")?;
    json.push('\n');
    write_atomic(path, &json).with_context(|| format!("write run report {}", path.display()))
}
