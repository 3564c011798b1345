//! # Differencing and Lag Feature Builder
//!
//! Turns a [`TimeSeries`] into the supervised-learning table the quantile
//! regression is fitted on. The target column is the `d`-times differenced
//! hospitalization channel; every feature column is a differenced channel
//! shifted back by one configured lag offset.
//!
//! Column order is canonical and shared with the synthetic lag window used at
//! prediction time: hospitalization lags in configured order, then wastewater
//! lags in configured order.
//!
//! A row is emitted only when every lag it references exists, so a series of
//! length `n` yields exactly `n - d - max(L)` rows (or none).

use crate::forecast::types::{Channel, TimeSeries};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use thiserror::Error;

/// Invalid lag configurations and channel mismatches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LagError {
    #[error("The {0} lag set is empty; at least one lag offset is required.")]
    EmptyLagSet(Channel),

    #[error("The {0} lag set contains a zero offset; lags must be at least one period.")]
    ZeroLag(Channel),

    #[error("The differencing order must be at least 1.")]
    ZeroOrder,

    #[error("The lag specification needs the {0} channel, but the series does not carry it.")]
    MissingChannel(Channel),
}

/// Lag offsets per channel plus the differencing order applied to all channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LagSpec {
    hospitalization: Vec<usize>,
    wastewater: Option<Vec<usize>>,
    order: usize,
}

impl LagSpec {
    /// Hospitalization lags only.
    pub fn single(hospitalization: Vec<usize>, order: usize) -> Result<Self, LagError> {
        Self::validated(hospitalization, None, order)
    }

    /// Hospitalization lags plus an independently configured wastewater lag set.
    pub fn dual(
        hospitalization: Vec<usize>,
        wastewater: Vec<usize>,
        order: usize,
    ) -> Result<Self, LagError> {
        Self::validated(hospitalization, Some(wastewater), order)
    }

    fn validated(
        hospitalization: Vec<usize>,
        wastewater: Option<Vec<usize>>,
        order: usize,
    ) -> Result<Self, LagError> {
        if order == 0 {
            return Err(LagError::ZeroOrder);
        }
        check_lag_set(&hospitalization, Channel::Hospitalization)?;
        if let Some(ww) = &wastewater {
            check_lag_set(ww, Channel::Wastewater)?;
        }
        Ok(Self {
            hospitalization,
            wastewater,
            order,
        })
    }

    pub fn hospitalization_lags(&self) -> &[usize] {
        &self.hospitalization
    }

    pub fn wastewater_lags(&self) -> Option<&[usize]> {
        self.wastewater.as_deref()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// The largest offset across both channels; both lag families are
    /// truncated to it so they stay row-aligned.
    pub fn max_lag(&self) -> usize {
        self.hospitalization
            .iter()
            .chain(self.wastewater.iter().flatten())
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn n_features(&self) -> usize {
        self.hospitalization.len() + self.wastewater.as_ref().map_or(0, Vec::len)
    }

    /// Column names in canonical order, e.g. `["hosp_lag1", "hosp_lag2", "ww_lag2"]`.
    pub fn column_names(&self) -> Vec<String> {
        let hosp = self
            .hospitalization
            .iter()
            .map(|l| format!("{}_lag{l}", Channel::Hospitalization.prefix()));
        let ww = self
            .wastewater
            .iter()
            .flatten()
            .map(|l| format!("{}_lag{l}", Channel::Wastewater.prefix()));
        hosp.chain(ww).collect()
    }
}

fn check_lag_set(lags: &[usize], channel: Channel) -> Result<(), LagError> {
    if lags.is_empty() {
        return Err(LagError::EmptyLagSet(channel));
    }
    if lags.contains(&0) {
        return Err(LagError::ZeroLag(channel));
    }
    Ok(())
}

/// Applies first differencing `order` times. Element `j` of the result is the
/// differenced value whose newest term sits at original position `j + order`.
pub fn difference(values: ArrayView1<f64>, order: usize) -> Array1<f64> {
    let mut current = values.to_owned();
    for _ in 0..order {
        if current.len() < 2 {
            return Array1::zeros(0);
        }
        current = current
            .windows(2)
            .into_iter()
            .map(|w| w[1] - w[0])
            .collect();
    }
    current
}

/// The supervised-learning table built from one series.
#[derive(Debug, Clone, PartialEq)]
pub struct LaggedTable {
    target: Array1<f64>,
    features: Array2<f64>,
    time_indices: Vec<usize>,
    columns: Vec<String>,
}

impl LaggedTable {
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    pub fn target(&self) -> ArrayView1<'_, f64> {
        self.target.view()
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    /// Position in the original series of each row's target observation.
    pub fn time_indices(&self) -> &[usize] {
        &self.time_indices
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Rows whose target and features are all finite, as `(target, features)`.
    /// Fitting requires complete data; everywhere else `NaN` propagates.
    pub fn complete_rows(&self) -> (Array1<f64>, Array2<f64>) {
        let keep: Vec<usize> = (0..self.n_rows())
            .filter(|&i| {
                self.target[i].is_finite() && self.features.row(i).iter().all(|v| v.is_finite())
            })
            .collect();
        (
            self.target.select(Axis(0), &keep),
            self.features.select(Axis(0), &keep),
        )
    }
}

/// Builds the lagged feature table for `series` under `spec`.
///
/// Single-channel specs read only the hospitalization channel. Dual-channel
/// specs additionally read the wastewater channel, differenced by the same
/// order, and both lag families start at the same row (`max` of all offsets).
pub fn build_lagged_table(series: &TimeSeries, spec: &LagSpec) -> Result<LaggedTable, LagError> {
    let order = spec.order();
    let hosp = difference(series.hospitalization(), order);
    let ww = match spec.wastewater_lags() {
        Some(_) => {
            let channel = series
                .wastewater()
                .ok_or(LagError::MissingChannel(Channel::Wastewater))?;
            Some(difference(channel, order))
        }
        None => None,
    };

    let max_lag = spec.max_lag();
    let n_rows = hosp.len().saturating_sub(max_lag);

    // One `(differenced channel, lag)` pair per feature column, in column order.
    let mut sources: Vec<(ArrayView1<f64>, usize)> = spec
        .hospitalization_lags()
        .iter()
        .map(|&l| (hosp.view(), l))
        .collect();
    if let (Some(lags), Some(ww)) = (spec.wastewater_lags(), ww.as_ref()) {
        sources.extend(lags.iter().map(|&l| (ww.view(), l)));
    }

    let target: Array1<f64> = hosp.iter().skip(max_lag).copied().collect();
    let features = Array2::from_shape_fn((n_rows, sources.len()), |(row, col)| {
        let (values, lag) = sources[col];
        values[row + max_lag - lag]
    });
    let time_indices = (0..n_rows).map(|row| row + max_lag + order).collect();

    Ok(LaggedTable {
        target,
        features,
        time_indices,
        columns: spec.column_names(),
    })
}
