//! Validated run parameters.

use serde::Serialize;

use crate::error::PipelineError;

/// Inclusive calendar-year range of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    /// Date span used in file names: `{start}-01-01_{end}-12-31`.
    pub fn date_span(&self) -> String {
        format!("{}-01-01_{}-12-31", self.start, self.end)
    }
}

/// Location and period of a single run.
///
/// Only constructible through [`RunParameters::new`], so every instance
/// satisfies the coordinate and year-order invariants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParameters {
    latitude: f64,
    longitude: f64,
    start_year: i32,
    end_year: i32,
    site_id: Option<String>,
}

impl RunParameters {
    pub fn new(
        latitude: f64,
        longitude: f64,
        start_year: i32,
        end_year: i32,
        site_id: Option<String>,
    ) -> Result<Self, PipelineError> {
        check_coordinate("latitude", latitude, 90.0)?;
        check_coordinate("longitude", longitude, 180.0)?;
        if start_year > end_year {
            return Err(PipelineError::InvalidParameter {
                name: "START_YEAR".to_string(),
                value: start_year.to_string(),
                reason: format!("start year is after end year {end_year}"),
            });
        }
        let site_id = site_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        Ok(Self {
            latitude,
            longitude,
            start_year,
            end_year,
            site_id,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn years(&self) -> YearRange {
        YearRange {
            start: self.start_year,
            end: self.end_year,
        }
    }

    pub fn site_id(&self) -> Option<&str> {
        self.site_id.as_deref()
    }
}

fn check_coordinate(axis: &'static str, value: f64, limit: f64) -> Result<(), PipelineError> {
    if !value.is_finite() {
        return Err(PipelineError::InvalidCoordinate {
            axis,
            value,
            reason: "not a finite number",
        });
    }
    if value < -limit || value > limit {
        return Err(PipelineError::InvalidCoordinate {
            axis,
            value,
            reason: if limit == 90.0 {
                "outside [-90, 90]"
            } else {
                "outside [-180, 180]"
            },
        });
    }
    Ok(())
}
