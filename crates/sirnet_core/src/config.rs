//! Run configuration.
//!
//! Every settings struct has a `Default` matching the values the routines were
//! tuned with, and deserializes from partial JSON so callers only spell out
//! what they change.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationSettings;
use crate::solvers::OdeSettings;

/// How coupling matrices are addressed in a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreLayout {
    pub path_prefix: String,
    /// `chrono` format string applied to the date.
    pub time_format: String,
}

impl Default for StoreLayout {
    fn default() -> Self {
        Self {
            path_prefix: String::new(),
            time_format: "%Y-%m-%d".to_string(),
        }
    }
}

impl StoreLayout {
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            ..Self::default()
        }
    }

    pub fn key_for(&self, date: NaiveDate) -> String {
        let mut stamp = String::new();
        if write!(stamp, "{}", date.format(&self.time_format)).is_err() {
            log::warn!(
                "Invalid time format '{}'; falling back to ISO dates.",
                self.time_format
            );
            stamp = date.to_string();
        }
        let prefix = self.path_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            stamp
        } else {
            format!("{prefix}/{stamp}")
        }
    }
}

/// What to do when no coupling matrix is stored for an intermediate date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum StalenessPolicy {
    /// Keep using the last loaded matrix and log a warning.
    #[default]
    Tolerant,
    /// Abort with `SirError::MissingCoupling`.
    Strict,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IntegrationSettings {
    pub ode: OdeSettings,
    pub layout: StoreLayout,
    pub staleness: StalenessPolicy,
}

impl IntegrationSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse integration settings.")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FitSettings {
    pub integration: IntegrationSettings,
    pub calibration: CalibrationSettings,
}

impl FitSettings {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse fit settings.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solvers::SolverMethod;

    #[test]
    fn key_for_joins_prefix_and_formatted_date() {
        let date = NaiveDate::from_ymd_opt(2020, 3, 7).unwrap();
        let layout = StoreLayout::new("mobility/daily/");
        assert_eq!(layout.key_for(date), "mobility/daily/2020-03-07");

        let compact = StoreLayout {
            path_prefix: String::new(),
            time_format: "%Y%m%d".to_string(),
        };
        assert_eq!(compact.key_for(date), "20200307");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings = FitSettings::from_json_str(
            r#"{
                "integration": { "staleness": "Strict", "ode": { "method": "Dopri5" } },
                "calibration": { "observation_growth": 2.0 }
            }"#,
        )
        .expect("settings should parse");

        assert_eq!(settings.integration.staleness, StalenessPolicy::Strict);
        assert_eq!(settings.integration.ode.method, SolverMethod::Dopri5);
        assert_eq!(settings.integration.ode.rtol, OdeSettings::default().rtol);
        assert_eq!(settings.integration.layout.time_format, "%Y-%m-%d");
        assert_eq!(settings.calibration.observation_growth, 2.0);
        assert_eq!(settings.calibration.max_expansions, 10);
    }

    #[test]
    fn malformed_json_reports_context() {
        let err = IntegrationSettings::from_json_str("{ not json").expect_err("should fail");
        assert!(format!("{err}").contains("integration settings"));
    }
}
