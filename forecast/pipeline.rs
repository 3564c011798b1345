use crate::forecast::inverter::{InverterError, ReconstructedPredictionRow, invert_differencing};
use crate::forecast::lags::{LagError, LagSpec};
use crate::forecast::metrics::{ErrorRow, naive_baseline_errors, one_step_errors};
use crate::forecast::predictor::{PredictError, PredictionTable, predict_multi_step};
use crate::forecast::regression::QuantileRegressor;
use crate::forecast::trainer::{RollingSchedule, TrainError, train_rolling_origin};
use crate::forecast::types::TimeSeries;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The forecasters under comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelFamily {
    /// Lagged hospitalization only.
    #[serde(rename = "hosp")]
    HospitalizationOnly,
    /// Lagged hospitalization plus lagged wastewater.
    #[serde(rename = "hosp_ww")]
    HospitalizationWastewater,
    /// Last value carried forward.
    #[serde(rename = "naive")]
    Naive,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 3] = [
        ModelFamily::HospitalizationOnly,
        ModelFamily::HospitalizationWastewater,
        ModelFamily::Naive,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::HospitalizationOnly => "hosp",
            Self::HospitalizationWastewater => "hosp_ww",
            Self::Naive => "naive",
        }
    }

    pub fn uses_wastewater(self) -> bool {
        matches!(self, Self::HospitalizationWastewater)
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown model family '{0}'; expected one of hosp, hosp_ww, naive.")]
pub struct UnknownFamily(pub String);

impl FromStr for ModelFamily {
    type Err = UnknownFamily;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|family| family.label() == s)
            .ok_or_else(|| UnknownFamily(s.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum ForecastError {
    #[error(transparent)]
    Lags(#[from] LagError),

    #[error(transparent)]
    Train(#[from] TrainError),

    #[error(transparent)]
    Predict(#[from] PredictError),

    #[error(transparent)]
    Inverter(#[from] InverterError),
}

/// Validated settings shared by every family of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub hospitalization_lags: Vec<usize>,
    pub wastewater_lags: Vec<usize>,
    pub differencing_order: usize,
    pub schedule: RollingSchedule,
    pub horizon: usize,
    pub quantile: f64,
}

impl PipelineSettings {
    /// The lag specification of a regression family; `None` for the baseline.
    pub fn lag_spec(&self, family: ModelFamily) -> Result<Option<LagSpec>, LagError> {
        match family {
            ModelFamily::HospitalizationOnly => Ok(Some(LagSpec::single(
                self.hospitalization_lags.clone(),
                self.differencing_order,
            )?)),
            ModelFamily::HospitalizationWastewater => Ok(Some(LagSpec::dual(
                self.hospitalization_lags.clone(),
                self.wastewater_lags.clone(),
                self.differencing_order,
            )?)),
            ModelFamily::Naive => Ok(None),
        }
    }
}

/// Everything one state/family run produced.
#[derive(Debug, Clone)]
pub struct FamilyEvaluation {
    pub family: ModelFamily,
    pub models_fitted: usize,
    /// Empty for the baseline.
    pub predictions: Option<PredictionTable>,
    pub reconstructed: Vec<ReconstructedPredictionRow>,
    pub errors: Vec<ErrorRow>,
}

/// Runs lag features, rolling-origin training, multi-step prediction,
/// differencing inversion and one-step error aggregation in sequence. The
/// baseline skips straight to the error stage.
pub fn evaluate_family<R: QuantileRegressor>(
    series: &TimeSeries,
    family: ModelFamily,
    settings: &PipelineSettings,
    regressor: &R,
) -> Result<FamilyEvaluation, ForecastError> {
    let Some(spec) = settings.lag_spec(family)? else {
        let errors = naive_baseline_errors(series, &settings.schedule, settings.horizon);
        return Ok(FamilyEvaluation {
            family,
            models_fitted: 0,
            predictions: None,
            reconstructed: Vec::new(),
            errors,
        });
    };

    let records = train_rolling_origin(
        series,
        &spec,
        &settings.schedule,
        settings.horizon,
        regressor,
        settings.quantile,
    )?;
    let table = predict_multi_step(&records, series, &spec, settings.horizon, family.label())?;
    let reconstructed = invert_differencing(&table, series, spec.order())?;
    let errors = one_step_errors(&reconstructed);

    log::debug!(
        "{family}: {} models, {} forecasts, {} overrun origins, {} errors",
        records.len(),
        table.len(),
        table.overrun_origins.len(),
        errors.len()
    );

    Ok(FamilyEvaluation {
        family,
        models_fitted: records.len(),
        predictions: Some(table),
        reconstructed,
        errors,
    })
}
