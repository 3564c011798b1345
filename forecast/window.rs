//! Recursive forecasting has no future data to read lags from, so the predictor
//! keeps a sliding window of differenced values and reads every lag column as
//! an offset into it. Predictions are pushed into the hospitalization buffer
//! only. Wastewater lags keep reading observed values, shifted by the number of
//! steps already taken, so a wastewater lag must exceed the step it is used at.

use crate::forecast::lags::{LagSpec, difference};
use crate::forecast::types::{Channel, TimeSeries};
use ndarray::Array1;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("The {channel} history holds {available} differenced values, but lag {required} is configured.")]
    ShortHistory {
        channel: Channel,
        available: usize,
        required: usize,
    },

    #[error("Wastewater lag {lag} would read an unobserved value at forecast step {step}; wastewater lags must exceed every step but the first.")]
    UnobservedLag { lag: usize, step: usize },

    #[error("The lag specification needs the {0} channel, but the series does not carry it.")]
    MissingChannel(Channel),
}

/// The most recent differenced values of one channel, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct LagBuffer {
    values: VecDeque<f64>,
    capacity: usize,
}

impl LagBuffer {
    /// Keeps the last `capacity` values of `history`.
    pub fn seed(history: &[f64], capacity: usize, channel: Channel) -> Result<Self, WindowError> {
        if history.len() < capacity {
            return Err(WindowError::ShortHistory {
                channel,
                available: history.len(),
                required: capacity,
            });
        }
        Ok(Self {
            values: history[history.len() - capacity..].iter().copied().collect(),
            capacity,
        })
    }

    /// The value `lag` periods before the slot being predicted (`lag >= 1`).
    pub fn lag(&self, lag: usize) -> f64 {
        self.values[self.values.len() - lag]
    }

    /// A new buffer with `value` appended and the oldest value dropped.
    pub fn pushed(&self, value: f64) -> Self {
        let mut values = self.values.clone();
        values.push_back(value);
        while values.len() > self.capacity {
            values.pop_front();
        }
        Self {
            values,
            capacity: self.capacity,
        }
    }
}

/// Per-channel buffers plus the lag offsets that read from them.
#[derive(Debug, Clone, PartialEq)]
pub struct LagWindow {
    hospitalization: LagBuffer,
    hospitalization_lags: Vec<usize>,
    wastewater: Option<(LagBuffer, Vec<usize>)>,
    /// Number of predictions already pushed into the hospitalization buffer.
    steps_taken: usize,
}

impl LagWindow {
    /// Seeds the window with the observed differenced history of the first
    /// `cutoff` observations. The first feature row then targets position
    /// `cutoff` of the original series.
    pub fn seed(series: &TimeSeries, spec: &LagSpec, cutoff: usize) -> Result<Self, WindowError> {
        let head = series.truncate(cutoff);
        let order = spec.order();

        let hosp_lags = spec.hospitalization_lags().to_vec();
        let hosp_history = difference(head.hospitalization(), order);
        let hospitalization = LagBuffer::seed(
            hosp_history.as_slice().unwrap_or(&[]),
            max_of(&hosp_lags),
            Channel::Hospitalization,
        )?;

        let wastewater = match spec.wastewater_lags() {
            Some(lags) => {
                let channel = head
                    .wastewater()
                    .ok_or(WindowError::MissingChannel(Channel::Wastewater))?;
                let history = difference(channel, order);
                let buffer = LagBuffer::seed(
                    history.as_slice().unwrap_or(&[]),
                    max_of(lags),
                    Channel::Wastewater,
                )?;
                Some((buffer, lags.to_vec()))
            }
            None => None,
        };

        Ok(Self {
            hospitalization,
            hospitalization_lags: hosp_lags,
            wastewater,
            steps_taken: 0,
        })
    }

    pub fn steps_taken(&self) -> usize {
        self.steps_taken
    }

    /// The feature vector for the next slot, in canonical column order.
    pub fn feature_row(&self) -> Result<Array1<f64>, WindowError> {
        let mut row: Vec<f64> = self
            .hospitalization_lags
            .iter()
            .map(|&l| self.hospitalization.lag(l))
            .collect();

        if let Some((buffer, lags)) = &self.wastewater {
            for &l in lags {
                if l <= self.steps_taken {
                    return Err(WindowError::UnobservedLag {
                        lag: l,
                        step: self.steps_taken + 1,
                    });
                }
                row.push(buffer.lag(l - self.steps_taken));
            }
        }

        Ok(Array1::from_vec(row))
    }

    fn advanced(&self, prediction: f64) -> Self {
        Self {
            hospitalization: self.hospitalization.pushed(prediction),
            hospitalization_lags: self.hospitalization_lags.clone(),
            wastewater: self.wastewater.clone(),
            steps_taken: self.steps_taken + 1,
        }
    }
}

/// Treats `prediction` as the newest hospitalization difference and returns
/// the advanced window with the feature vector for the following slot.
pub fn next_feature_vector(
    window: &LagWindow,
    prediction: f64,
) -> Result<(LagWindow, Array1<f64>), WindowError> {
    let next = window.advanced(prediction);
    let row = next.feature_row()?;
    Ok((next, row))
}

fn max_of(lags: &[usize]) -> usize {
    lags.iter().copied().max().unwrap_or(0)
}
