//! # Time Series Container
//!
//! A weekly state series: strictly increasing dates, a hospitalization channel
//! and an optional wastewater channel aligned with it by position. Missing
//! values are `NaN`; only model fitting drops them.

use chrono::NaiveDate;
use ndarray::{Array1, ArrayView1, s};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Names one of the two value channels of a [`TimeSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Hospitalization,
    Wastewater,
}

impl Channel {
    /// Short prefix used for lag column names (`hosp_lag1`, `ww_lag2`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Hospitalization => "hosp",
            Self::Wastewater => "ww",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hospitalization => f.write_str("hospitalization"),
            Self::Wastewater => f.write_str("wastewater"),
        }
    }
}

/// Structural problems detected while assembling a [`TimeSeries`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Dates must be strictly increasing, but date at position {index} ({date}) does not follow its predecessor.")]
    NonIncreasingDates { index: usize, date: NaiveDate },

    #[error("The {channel} channel has {found} values, but the series has {expected} dates.")]
    LengthMismatch {
        channel: Channel,
        expected: usize,
        found: usize,
    },
}

/// An ordered weekly series with one or two aligned value channels.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    dates: Vec<NaiveDate>,
    hospitalization: Array1<f64>,
    wastewater: Option<Array1<f64>>,
}

impl TimeSeries {
    /// Builds a hospitalization-only series.
    pub fn single(dates: Vec<NaiveDate>, hospitalization: Vec<f64>) -> Result<Self, SeriesError> {
        Self::build(dates, hospitalization, None)
    }

    /// Builds a series carrying both the hospitalization and wastewater channels.
    pub fn dual(
        dates: Vec<NaiveDate>,
        hospitalization: Vec<f64>,
        wastewater: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        Self::build(dates, hospitalization, Some(wastewater))
    }

    fn build(
        dates: Vec<NaiveDate>,
        hospitalization: Vec<f64>,
        wastewater: Option<Vec<f64>>,
    ) -> Result<Self, SeriesError> {
        if let Some(index) = dates.windows(2).position(|w| w[1] <= w[0]) {
            return Err(SeriesError::NonIncreasingDates {
                index: index + 1,
                date: dates[index + 1],
            });
        }
        if hospitalization.len() != dates.len() {
            return Err(SeriesError::LengthMismatch {
                channel: Channel::Hospitalization,
                expected: dates.len(),
                found: hospitalization.len(),
            });
        }
        if let Some(ww) = &wastewater {
            if ww.len() != dates.len() {
                return Err(SeriesError::LengthMismatch {
                    channel: Channel::Wastewater,
                    expected: dates.len(),
                    found: ww.len(),
                });
            }
        }

        Ok(Self {
            dates,
            hospitalization: Array1::from_vec(hospitalization),
            wastewater: wastewater.map(Array1::from_vec),
        })
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    /// Date of the observation at zero-based position `index`, if it exists.
    pub fn date(&self, index: usize) -> Option<NaiveDate> {
        self.dates.get(index).copied()
    }

    pub fn hospitalization(&self) -> ArrayView1<'_, f64> {
        self.hospitalization.view()
    }

    pub fn wastewater(&self) -> Option<ArrayView1<'_, f64>> {
        self.wastewater.as_ref().map(Array1::view)
    }

    /// Returns the values of the requested channel, or `None` when the series
    /// does not carry it.
    pub fn channel(&self, channel: Channel) -> Option<ArrayView1<'_, f64>> {
        match channel {
            Channel::Hospitalization => Some(self.hospitalization()),
            Channel::Wastewater => self.wastewater(),
        }
    }

    pub fn has_wastewater(&self) -> bool {
        self.wastewater.is_some()
    }

    /// The first `n` observations as a new series. Asking for more than the
    /// series holds yields the whole series.
    pub fn truncate(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            dates: self.dates[..n].to_vec(),
            hospitalization: self.hospitalization.slice(s![..n]).to_owned(),
            wastewater: self.wastewater.as_ref().map(|ww| ww.slice(s![..n]).to_owned()),
        }
    }

    /// Observations `start..end` as a new series, clamped to the series bounds.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        let end = end.min(self.len());
        let start = start.min(end);
        Self {
            dates: self.dates[start..end].to_vec(),
            hospitalization: self.hospitalization.slice(s![start..end]).to_owned(),
            wastewater: self
                .wastewater
                .as_ref()
                .map(|ww| ww.slice(s![start..end]).to_owned()),
        }
    }

    /// The same series without its wastewater channel.
    pub fn hospitalization_only(&self) -> Self {
        Self {
            dates: self.dates.clone(),
            hospitalization: self.hospitalization.clone(),
            wastewater: None,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::Duration;

    /// Weekly dates starting on Monday 2022-01-03.
    pub fn weekly_dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
        (0..n).map(|i| start + Duration::weeks(i as i64)).collect()
    }

    pub fn single_series(values: &[f64]) -> TimeSeries {
        TimeSeries::single(weekly_dates(values.len()), values.to_vec()).unwrap()
    }

    pub fn dual_series(hosp: &[f64], ww: &[f64]) -> TimeSeries {
        TimeSeries::dual(weekly_dates(hosp.len()), hosp.to_vec(), ww.to_vec()).unwrap()
    }
}
