//! Fits one quantile regression per training origin. Origin `k` sees only the
//! first `k` observations of the series: the series is truncated, lag features
//! are rebuilt from the truncation, incomplete rows are dropped, and a single
//! model is fitted at the configured quantile level.
//!
//! Record `i` belongs to origin `start_index + i * increment`, so a failed fit
//! aborts the whole run instead of leaving a gap.

use crate::forecast::lags::{LagError, LagSpec, build_lagged_table};
use crate::forecast::regression::{FitError, QuantileRegressor};
use crate::forecast::types::TimeSeries;
use chrono::NaiveDate;
use rayon::prelude::*;
use thiserror::Error;

/// Invalid rolling-origin schedules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("The rolling-origin start index must be at least 1.")]
    ZeroStart,
    #[error("The rolling-origin increment must be at least 1.")]
    ZeroIncrement,
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("Lag feature construction failed: {0}")]
    Lags(#[from] LagError),

    #[error("Model fitting failed for the origin trained on the first {origin} observations: {source}")]
    FitFailure {
        origin: usize,
        #[source]
        source: FitError,
    },

    #[error(
        "A series of {observations} observations yields no training origin when starting at {start_index} with a horizon of {horizon}."
    )]
    NoOrigins {
        observations: usize,
        start_index: usize,
        horizon: usize,
    },
}

/// The walk-forward refitting schedule: `start_index, start_index + increment, ...`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollingSchedule {
    start_index: usize,
    increment: usize,
}

impl RollingSchedule {
    pub fn new(start_index: usize, increment: usize) -> Result<Self, ScheduleError> {
        if start_index == 0 {
            return Err(ScheduleError::ZeroStart);
        }
        if increment == 0 {
            return Err(ScheduleError::ZeroIncrement);
        }
        Ok(Self {
            start_index,
            increment,
        })
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn increment(&self) -> usize {
        self.increment
    }

    /// Training cutoffs for a series of `n_observations` forecast `horizon`
    /// steps ahead. Origin `k` is kept while `k + horizon <= n_observations`,
    /// so a ten-point series starting at 7 trains origins 7 and 8 for a
    /// horizon of 2, and 7, 8 and 9 for a horizon of 1.
    pub fn origins(&self, n_observations: usize, horizon: usize) -> Vec<usize> {
        let last = n_observations.saturating_sub(horizon);
        (self.start_index..=last).step_by(self.increment).collect()
    }

    /// Smallest series length that yields at least one origin.
    pub fn min_observations(&self, horizon: usize) -> usize {
        self.start_index + horizon
    }
}

/// One fitted model together with the point in time it was trained up to.
#[derive(Debug, Clone)]
pub struct FittedModelRecord<M> {
    pub model: M,
    /// Date of the last observation the model saw.
    pub training_cutoff_date: NaiveDate,
    /// Number of observations the model was trained on.
    pub training_cutoff_index: usize,
}

/// Fits one model per origin of `schedule` that leaves room for `horizon`
/// forecast steps, in origin order.
pub fn train_rolling_origin<R: QuantileRegressor>(
    series: &TimeSeries,
    spec: &LagSpec,
    schedule: &RollingSchedule,
    horizon: usize,
    regressor: &R,
    quantile: f64,
) -> Result<Vec<FittedModelRecord<R::Model>>, TrainError> {
    let origins = schedule.origins(series.len(), horizon);
    if origins.is_empty() {
        return Err(TrainError::NoOrigins {
            observations: series.len(),
            start_index: schedule.start_index(),
            horizon,
        });
    }

    log::debug!(
        "Training {} rolling origins ({}..{} step {}) with {} lag features",
        origins.len(),
        origins[0],
        origins[origins.len() - 1],
        schedule.increment(),
        spec.n_features()
    );

    // Fit in parallel, then fold sequentially so the reported failure is always
    // the earliest failing origin.
    let fitted: Vec<_> = origins
        .into_par_iter()
        .map(|origin| fit_origin(series, spec, origin, regressor, quantile))
        .collect();
    fitted.into_iter().collect()
}

fn fit_origin<R: QuantileRegressor>(
    series: &TimeSeries,
    spec: &LagSpec,
    origin: usize,
    regressor: &R,
    quantile: f64,
) -> Result<FittedModelRecord<R::Model>, TrainError> {
    let truncated = series.truncate(origin);
    let table = build_lagged_table(&truncated, spec)?;
    let (target, features) = table.complete_rows();
    log::trace!(
        "Origin {origin}: {} of {} rows complete over [{}], last target at position {}",
        target.len(),
        table.n_rows(),
        table.columns().join(", "),
        table.time_indices().last().copied().unwrap_or(0)
    );

    let model = regressor
        .fit(target.view(), features.view(), quantile)
        .map_err(|source| TrainError::FitFailure { origin, source })?;

    // The schedule keeps every origin in `1..n`.
    let training_cutoff_date = truncated.dates()[origin - 1];

    Ok(FittedModelRecord {
        model,
        training_cutoff_date,
        training_cutoff_index: origin,
    })
}
