use crate::forecast::lags::LagSpec;
use crate::forecast::regression::QuantileModel;
use crate::forecast::trainer::FittedModelRecord;
use crate::forecast::types::TimeSeries;
use crate::forecast::window::{LagWindow, WindowError, next_feature_vector};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    #[error("The forecast horizon must be at least 1.")]
    ZeroHorizon,

    #[error("Could not roll the model trained on {origin} observations forward: {source}")]
    Window {
        origin: usize,
        #[source]
        source: WindowError,
    },
}

/// One forecast in the differenced scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionRow {
    /// `"<family>@<training cutoff index>"`.
    pub model_name: String,
    pub date: NaiveDate,
    /// Zero-based position of the predicted target in the original series.
    pub time_index: usize,
    /// 1-based step within the forecast horizon.
    pub horizon_step: usize,
    pub prediction: f64,
}

/// All forecasts of one state/family run, ordered by origin, then step.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionTable {
    pub rows: Vec<PredictionRow>,
    pub horizon: usize,
    /// Training cutoff indices whose horizon overran the series.
    pub overrun_origins: Vec<usize>,
}

impl PredictionTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Produces `horizon` recursive forecasts for every record whose horizon fits
/// inside `series`. The first step reads observed lags only; later steps read
/// the hospitalization lags from a [`LagWindow`] holding earlier predictions.
///
/// A record with `training_cutoff_index + horizon > n` is skipped and listed in
/// [`PredictionTable::overrun_origins`] rather than failing the table.
pub fn predict_multi_step<M: QuantileModel>(
    records: &[FittedModelRecord<M>],
    series: &TimeSeries,
    spec: &LagSpec,
    horizon: usize,
    label: &str,
) -> Result<PredictionTable, PredictError> {
    if horizon == 0 {
        return Err(PredictError::ZeroHorizon);
    }

    let n = series.len();
    let (kept, overrun): (Vec<_>, Vec<_>) = records
        .iter()
        .partition(|record| record.training_cutoff_index + horizon <= n);

    let overrun_origins: Vec<usize> = overrun.iter().map(|r| r.training_cutoff_index).collect();
    for origin in &overrun_origins {
        log::debug!(
            "{label}: origin {origin} + horizon {horizon} exceeds the {n} available observations; skipping"
        );
    }

    let blocks: Vec<Result<Vec<PredictionRow>, PredictError>> = kept
        .into_par_iter()
        .map(|record| roll_forward(record, series, spec, horizon, label))
        .collect();

    let mut rows = Vec::with_capacity(blocks.len() * horizon);
    for block in blocks {
        rows.extend(block?);
    }

    Ok(PredictionTable {
        rows,
        horizon,
        overrun_origins,
    })
}

fn roll_forward<M: QuantileModel>(
    record: &FittedModelRecord<M>,
    series: &TimeSeries,
    spec: &LagSpec,
    horizon: usize,
    label: &str,
) -> Result<Vec<PredictionRow>, PredictError> {
    let origin = record.training_cutoff_index;
    let window_error = |source| PredictError::Window { origin, source };
    let model_name = format!("{label}@{origin}");

    let mut window = LagWindow::seed(series, spec, origin).map_err(window_error)?;
    let mut features = window.feature_row().map_err(window_error)?;
    let mut rows = Vec::with_capacity(horizon);

    for step in 1..=horizon {
        let prediction = record.model.predict(features.view());
        let time_index = origin + step - 1;
        rows.push(PredictionRow {
            model_name: model_name.clone(),
            date: series.dates()[time_index],
            time_index,
            horizon_step: step,
            prediction,
        });

        if step < horizon {
            let (next, row) = next_feature_vector(&window, prediction).map_err(window_error)?;
            window = next;
            features = row;
        }
    }

    Ok(rows)
}
