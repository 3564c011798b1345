//! # Differencing Inverter
//!
//! Maps differenced forecasts back onto the original scale. The prediction
//! table is processed one origin block (`horizon` rows) at a time:
//!
//! 1.  Check that the block really is one origin: steps `1..=h` with
//!     consecutive time indices.
//! 2.  Read the `d` anchors `Δ^j y[t0 - 1]`, `j = 0..d`, from the observed series,
//!     where `t0` is the block's first predicted position.
//! 3.  Integrate the predictions `d` times, each pass a cumulative sum onto its
//!     anchor, and attach the observed value at every row's time index.
//!
//! Any structural violation is reported; the inverter never guesses an
//! alignment.

use crate::forecast::lags::difference;
use crate::forecast::predictor::{PredictionRow, PredictionTable};
use crate::forecast::types::TimeSeries;
use ndarray::{ArrayView1, s};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InverterError {
    #[error("The prediction table has {rows} rows, which is not a whole number of {horizon}-step blocks.")]
    RaggedTable { rows: usize, horizon: usize },

    #[error("Row {row} of block {block} breaks the 1..=h step sequence or its consecutive time indices.")]
    MalformedBlock { block: usize, row: usize },

    #[error("Inverting order-{order} differencing at time index {time_index} needs {order} earlier observations.")]
    InsufficientAnchor { time_index: usize, order: usize },

    #[error("Time index {time_index} lies outside the series of {len} observations.")]
    OutOfRange { time_index: usize, len: usize },
}

/// A forecast with its original-scale value and the observed truth.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconstructedPredictionRow {
    pub forecast: PredictionRow,
    pub original_scale_prediction: f64,
    pub original_scale_actual: f64,
}

/// Reconstructs every block of `table` on the scale of `series`.
pub fn invert_differencing(
    table: &PredictionTable,
    series: &TimeSeries,
    order: usize,
) -> Result<Vec<ReconstructedPredictionRow>, InverterError> {
    let horizon = table.horizon;
    if horizon == 0 || table.rows.len() % horizon != 0 {
        return Err(InverterError::RaggedTable {
            rows: table.rows.len(),
            horizon,
        });
    }

    let observed = series.hospitalization();
    let mut reconstructed = Vec::with_capacity(table.rows.len());
    for (block_index, block) in table.rows.chunks(horizon).enumerate() {
        reconstructed.extend(invert_block(block, block_index, observed, order)?);
    }
    Ok(reconstructed)
}

fn invert_block(
    block: &[PredictionRow],
    block_index: usize,
    observed: ArrayView1<f64>,
    order: usize,
) -> Result<Vec<ReconstructedPredictionRow>, InverterError> {
    // --- 1. Block Shape ---
    let first = block[0].time_index;
    for (i, row) in block.iter().enumerate() {
        if row.horizon_step != i + 1 || row.time_index != first + i {
            return Err(InverterError::MalformedBlock {
                block: block_index,
                row: i,
            });
        }
    }
    let last = first + block.len() - 1;
    if last >= observed.len() {
        return Err(InverterError::OutOfRange {
            time_index: last,
            len: observed.len(),
        });
    }
    if first < order {
        return Err(InverterError::InsufficientAnchor {
            time_index: first,
            order,
        });
    }

    // --- 2. Anchors ---
    // anchors[j] is the j-th difference whose newest term is at `first - 1`.
    let anchors: Vec<f64> = (0..order)
        .map(|j| difference(observed.slice(s![first - 1 - j..first]), j)[0])
        .collect();

    // --- 3. Integrate ---
    let mut level: Vec<f64> = block.iter().map(|row| row.prediction).collect();
    for anchor in anchors.iter().rev() {
        let mut running = *anchor;
        for value in level.iter_mut() {
            running += *value;
            *value = running;
        }
    }

    Ok(block
        .iter()
        .zip(level)
        .map(|(row, original_scale_prediction)| ReconstructedPredictionRow {
            forecast: row.clone(),
            original_scale_prediction,
            original_scale_actual: observed[row.time_index],
        })
        .collect())
}
