//! Canonical location keys.
//!
//! The key `lat{lat}_lon{lon}` names the scenario directory, the project
//! directory and every materialized file. The data-preparation collaborator
//! names its output with the same convention, so both sides must format
//! coordinates identically: [`format_coordinate`] is the only place that does
//! it, and the collaborator receives coordinates already formatted by it.

use std::fmt;

use serde::Serialize;

use crate::core::params::{RunParameters, YearRange};
use crate::error::PipelineError;

/// Render a coordinate with exactly six decimals, fixed point.
///
/// Rounding is round-half-to-even on the exact binary value, matching
/// Python's `f"{x:.6f}"`. Values that round to zero are rendered without a
/// sign.
pub fn format_coordinate(value: f64) -> String {
    let formatted = format!("{value:.6}");
    match formatted.strip_prefix('-') {
        Some(unsigned) if unsigned.bytes().all(|b| b == b'0' || b == b'.') => {
            unsigned.to_string()
        }
        _ => formatted,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct LocationKey(String);

impl LocationKey {
    pub fn derive(params: &RunParameters) -> Result<Self, PipelineError> {
        Self::from_coordinates(params.latitude(), params.longitude())
    }

    pub fn from_coordinates(latitude: f64, longitude: f64) -> Result<Self, PipelineError> {
        for (axis, value) in [("latitude", latitude), ("longitude", longitude)] {
            if !value.is_finite() {
                return Err(PipelineError::InvalidCoordinate {
                    axis,
                    value,
                    reason: "not a finite number",
                });
            }
        }
        Ok(Self(format!(
            "lat{}_lon{}",
            format_coordinate(latitude),
            format_coordinate(longitude)
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory name of the per-run project: `project_{key}`.
    pub fn project_dir_name(&self) -> String {
        format!("project_{}", self.0)
    }

    /// File stem shared by all materialized files:
    /// `{key}__{start}-01-01_{end}-12-31`.
    pub fn file_stem(&self, years: YearRange) -> String {
        format!("{}__{}", self.0, years.date_span())
    }
}

impl fmt::Display for LocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_uses_six_fixed_decimals() {
        let key = LocationKey::from_coordinates(51.3919, 11.8787).expect("key");
        assert_eq!(key.as_str(), "lat51.391900_lon11.878700");
    }

    #[test]
    fn key_is_deterministic() {
        let params = RunParameters::new(51.390427, 11.876855, 2017, 2021, None).expect("params");
        let first = LocationKey::derive(&params).expect("first");
        let second = LocationKey::derive(&params).expect("second");
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "lat51.390427_lon11.876855");
    }

    #[test]
    fn key_preserves_sign_without_scientific_notation() {
        let key = LocationKey::from_coordinates(-33.9, -0.0000004).expect("key");
        assert_eq!(key.as_str(), "lat-33.900000_lon0.000000");
        let key = LocationKey::from_coordinates(1e-7, -179.9999996).expect("key");
        assert_eq!(key.as_str(), "lat0.000000_lon-180.000000");
    }

    #[test]
    fn negative_zero_has_no_sign() {
        assert_eq!(format_coordinate(-0.0), "0.000000");
        assert_eq!(format_coordinate(-0.0000015), "-0.000002");
    }

    #[test]
    fn rounding_follows_exact_binary_value() {
        // 5e-7 is stored just below the midpoint, 2.0000005 just above it.
        assert_eq!(format_coordinate(0.0000005), "0.000000");
        assert_eq!(format_coordinate(-0.0000005), "0.000000");
        assert_eq!(format_coordinate(2.0000005), "2.000001");
    }

    #[test]
    fn non_finite_input_is_rejected() {
        let err = LocationKey::from_coordinates(f64::INFINITY, 0.0).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidCoordinate { axis: "latitude", .. }));
    }

    #[test]
    fn project_dir_and_stem() {
        let key = LocationKey::from_coordinates(51.3919, 11.8787).expect("key");
        assert_eq!(key.project_dir_name(), "project_lat51.391900_lon11.878700");
        let stem = key.file_stem(YearRange {
            start: 2017,
            end: 2021,
        });
        assert_eq!(stem, "lat51.391900_lon11.878700__2017-01-01_2021-12-31");
    }
}
