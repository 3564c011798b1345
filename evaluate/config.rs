//! # Run Configuration
//!
//! Every tunable of an evaluation run lives in one TOML file. Missing keys fall
//! back to the defaults below, so an empty file is a valid configuration.
//!
//! ```toml
//! hospitalization_lags = [1, 2]
//! wastewater_lags = [2]
//! differencing_order = 1
//! start_index = 7
//! increment = 1
//! horizon = 2
//! quantile = 0.5
//! min_observations = 9
//!
//! [regression]
//! max_iterations = 100
//! tolerance = 1e-8
//! ```
//!
//! [`RunConfig::validate`] is the only way to obtain [`PipelineSettings`], so
//! the forecasting core never sees an unchecked value.

use crate::forecast::lags::{LagError, LagSpec};
use crate::forecast::pipeline::{ModelFamily, PipelineSettings};
use crate::forecast::regression::IrlsQuantileRegressor;
use crate::forecast::trainer::{RollingSchedule, ScheduleError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Invalid lag configuration: {0}")]
    Lags(#[from] LagError),
    #[error("Invalid rolling-origin schedule: {0}")]
    Schedule(#[from] ScheduleError),
    #[error("The forecast horizon must be at least 1.")]
    ZeroHorizon,
    #[error("The quantile level must lie strictly between 0 and 1, but {0} was given.")]
    InvalidQuantile(f64),
    #[error(
        "Wastewater lag {lag} is shorter than the forecast horizon {horizon}; every wastewater lag must be at least the horizon so that no forecast step reads unobserved wastewater."
    )]
    WastewaterLagBelowHorizon { lag: usize, horizon: usize },
    #[error("The regression solver needs at least one iteration and a positive, finite tolerance.")]
    InvalidRegression,
}

/// The on-disk configuration of one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub hospitalization_lags: Vec<usize>,
    pub wastewater_lags: Vec<usize>,
    pub differencing_order: usize,
    /// Number of observations in the first training truncation.
    pub start_index: usize,
    pub increment: usize,
    pub horizon: usize,
    pub quantile: f64,
    /// States with fewer aligned observations are skipped.
    pub min_observations: usize,
    pub regression: IrlsQuantileRegressor,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            hospitalization_lags: vec![1, 2],
            wastewater_lags: vec![2],
            differencing_order: 1,
            start_index: 7,
            increment: 1,
            horizon: 2,
            quantile: 0.5,
            min_observations: 9,
            regression: IrlsQuantileRegressor::default(),
        }
    }
}

impl RunConfig {
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    /// Checks every field and returns the settings the forecasting core runs on.
    /// The wastewater lags are held against the horizon only when `families`
    /// includes the wastewater family.
    pub fn validate(&self, families: &[ModelFamily]) -> Result<PipelineSettings, ConfigError> {
        // Constructing both specs runs the lag and order checks.
        LagSpec::dual(
            self.hospitalization_lags.clone(),
            self.wastewater_lags.clone(),
            self.differencing_order,
        )?;
        let schedule = RollingSchedule::new(self.start_index, self.increment)?;

        if self.horizon == 0 {
            return Err(ConfigError::ZeroHorizon);
        }
        if !(self.quantile > 0.0 && self.quantile < 1.0) {
            return Err(ConfigError::InvalidQuantile(self.quantile));
        }
        let uses_wastewater = families.iter().any(|family| family.uses_wastewater());
        let shortest = self.wastewater_lags.iter().copied().min();
        if let Some(lag) = shortest.filter(|&lag| uses_wastewater && lag < self.horizon) {
            return Err(ConfigError::WastewaterLagBelowHorizon {
                lag,
                horizon: self.horizon,
            });
        }
        let tolerance = self.regression.tolerance;
        if self.regression.max_iterations == 0 || !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(ConfigError::InvalidRegression);
        }

        Ok(PipelineSettings {
            hospitalization_lags: self.hospitalization_lags.clone(),
            wastewater_lags: self.wastewater_lags.clone(),
            differencing_order: self.differencing_order,
            schedule,
            horizon: self.horizon,
            quantile: self.quantile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::types::Channel;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_validate() {
        let settings = RunConfig::default().validate(&ModelFamily::ALL).unwrap();
        assert_eq!(settings.hospitalization_lags, vec![1, 2]);
        assert_eq!(settings.wastewater_lags, vec![2]);
        assert_eq!(settings.schedule.start_index(), 7);
        assert_eq!(settings.horizon, 2);
    }

    #[test]
    fn save_load_round_trip_and_partial_files() {
        let file = NamedTempFile::new().unwrap();
        let mut config = RunConfig::default();
        config.hospitalization_lags = vec![1, 3, 4];
        config.regression.max_iterations = 250;
        config.save(file.path()).unwrap();
        assert_eq!(RunConfig::load(file.path()).unwrap(), config);

        fs::write(file.path(), "horizon = 1\n[regression]\ntolerance = 1e-6\n").unwrap();
        let partial = RunConfig::load(file.path()).unwrap();
        assert_eq!(partial.horizon, 1);
        assert_eq!(partial.start_index, 7);
        assert_eq!(partial.regression.tolerance, 1e-6);
        assert_eq!(partial.regression.max_iterations, 100);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let file = NamedTempFile::new().unwrap();
        fs::write(file.path(), "horizn = 3\n").unwrap();
        assert!(matches!(
            RunConfig::load(file.path()),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let check = |edit: fn(&mut RunConfig)| {
            let mut config = RunConfig::default();
            edit(&mut config);
            config.validate(&ModelFamily::ALL).unwrap_err()
        };

        assert!(matches!(
            check(|c| c.wastewater_lags = vec![]),
            ConfigError::Lags(LagError::EmptyLagSet(Channel::Wastewater))
        ));
        assert!(matches!(
            check(|c| c.hospitalization_lags = vec![0]),
            ConfigError::Lags(LagError::ZeroLag(Channel::Hospitalization))
        ));
        assert!(matches!(
            check(|c| c.differencing_order = 0),
            ConfigError::Lags(LagError::ZeroOrder)
        ));
        assert!(matches!(
            check(|c| c.increment = 0),
            ConfigError::Schedule(ScheduleError::ZeroIncrement)
        ));
        assert!(matches!(check(|c| c.horizon = 0), ConfigError::ZeroHorizon));
        assert!(matches!(
            check(|c| c.quantile = 0.0),
            ConfigError::InvalidQuantile(_)
        ));
        assert!(matches!(
            check(|c| c.horizon = 3),
            ConfigError::WastewaterLagBelowHorizon { lag: 2, horizon: 3 }
        ));
        assert!(matches!(
            check(|c| c.regression.tolerance = -1.0),
            ConfigError::InvalidRegression
        ));
    }

    #[test]
    fn wastewater_lags_only_bind_the_wastewater_family() {
        let config = RunConfig {
            horizon: 3,
            ..RunConfig::default()
        };
        let hosp_only = [ModelFamily::HospitalizationOnly, ModelFamily::Naive];
        assert_eq!(config.validate(&hosp_only).unwrap().horizon, 3);
        assert!(matches!(
            config.validate(&[ModelFamily::HospitalizationWastewater]),
            Err(ConfigError::WastewaterLagBelowHorizon { lag: 2, horizon: 3 })
        ));
    }
}
