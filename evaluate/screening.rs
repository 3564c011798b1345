//! Decides, before any model is fitted, whether a state can be evaluated for a
//! family and which part of its series is used. The hospitalization family and
//! the baseline use the span between the first and last observed
//! hospitalization value; the wastewater family uses the span where both
//! channels are observed.

use crate::forecast::lags::difference;
use crate::forecast::pipeline::{ModelFamily, PipelineSettings};
use crate::forecast::types::{Channel, TimeSeries};
use serde::Serialize;
use std::fmt;

/// Why a state was not evaluated for a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Fewer aligned observations than the configured minimum, or too few for
    /// the rolling schedule to reach a single origin.
    InsufficientHistory { observations: usize, required: usize },
    /// Hospitalization and wastewater are never observed in the same week.
    NoOverlap,
    /// A channel has at most one finite, non-zero differenced value.
    DegenerateSeries { channel: Channel },
}

impl SkipReason {
    /// Stable machine-readable tag.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::NoOverlap => "no_overlap",
            Self::DegenerateSeries { .. } => "degenerate_series",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientHistory {
                observations,
                required,
            } => write!(f, "{observations} aligned observations, {required} required"),
            Self::NoOverlap => f.write_str("hospitalization and wastewater never overlap"),
            Self::DegenerateSeries { channel } => {
                write!(f, "differenced {channel} series carries no signal")
            }
        }
    }
}

/// The series `family` should be evaluated on, or the reason to skip it.
///
/// A usable span needs `min_observations` weeks and enough weeks for the first
/// origin of `settings.schedule` to leave room for the full horizon.
pub fn screen(
    series: &TimeSeries,
    family: ModelFamily,
    settings: &PipelineSettings,
    min_observations: usize,
) -> Result<TimeSeries, SkipReason> {
    let usable = if family.uses_wastewater() {
        let wastewater = series.wastewater().ok_or(SkipReason::NoOverlap)?;
        let hospitalization = series.hospitalization();
        let both: Vec<bool> = hospitalization
            .iter()
            .zip(wastewater.iter())
            .map(|(h, w)| h.is_finite() && w.is_finite())
            .collect();
        let (start, end) = observed_span(&both).ok_or(SkipReason::NoOverlap)?;
        series.slice(start, end)
    } else {
        let observed: Vec<bool> = series.hospitalization().iter().map(|h| h.is_finite()).collect();
        let (start, end) = observed_span(&observed).unwrap_or((0, 0));
        series.hospitalization_only().slice(start, end)
    };

    let required = min_observations.max(settings.schedule.min_observations(settings.horizon));
    if usable.len() < required {
        return Err(SkipReason::InsufficientHistory {
            observations: usable.len(),
            required,
        });
    }

    if family != ModelFamily::Naive {
        for channel in [Channel::Hospitalization, Channel::Wastewater] {
            if let Some(values) = usable.channel(channel) {
                let informative = difference(values, settings.differencing_order)
                    .iter()
                    .filter(|v| v.is_finite() && **v != 0.0)
                    .count();
                if informative <= 1 {
                    return Err(SkipReason::DegenerateSeries { channel });
                }
            }
        }
    }

    Ok(usable)
}

/// `start..end` from the first to the last `true`.
fn observed_span(flags: &[bool]) -> Option<(usize, usize)> {
    let start = flags.iter().position(|&f| f)?;
    let end = flags.iter().rposition(|&f| f)? + 1;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluate::config::RunConfig;
    use crate::forecast::trainer::RollingSchedule;
    use crate::forecast::types::test_support::{dual_series, single_series};

    const NAN: f64 = f64::NAN;

    fn defaults() -> PipelineSettings {
        RunConfig::default().validate(&ModelFamily::ALL).unwrap()
    }

    fn rising(n: usize) -> Vec<f64> {
        (0..n).map(|i| 0.1 + 0.01 * (i * i) as f64).collect()
    }

    #[test]
    fn eight_points_are_too_few_and_nine_are_enough() {
        let short = single_series(&rising(8));
        assert_eq!(
            screen(&short, ModelFamily::HospitalizationOnly, &defaults(), 9).unwrap_err(),
            SkipReason::InsufficientHistory {
                observations: 8,
                required: 9
            }
        );
        assert_eq!(
            screen(&short, ModelFamily::Naive, &defaults(), 9).unwrap_err().tag(),
            "insufficient_history"
        );

        let enough = single_series(&rising(9));
        let usable = screen(&enough, ModelFamily::HospitalizationOnly, &defaults(), 9).unwrap();
        assert_eq!(usable.len(), 9);
    }

    #[test]
    fn leading_and_trailing_gaps_are_trimmed() {
        let mut values = vec![NAN, NAN];
        values.extend(rising(9));
        values.push(NAN);
        let series = single_series(&values);
        let usable = screen(&series, ModelFamily::HospitalizationOnly, &defaults(), 9).unwrap();
        assert_eq!(usable.len(), 9);
        assert_eq!(usable.date(0), series.date(2));
    }

    #[test]
    fn wastewater_family_uses_the_shared_span() {
        let hosp = rising(14);
        let mut ww: Vec<f64> = (0..14)
            .map(|i| 5.0 + 0.1 * (i % 4) as f64 + 0.05 * i as f64)
            .collect();
        ww[0] = NAN;
        ww[1] = NAN;
        ww[13] = NAN;
        let series = dual_series(&hosp, &ww);

        let usable =
            screen(&series, ModelFamily::HospitalizationWastewater, &defaults(), 9).unwrap();
        assert_eq!(usable.len(), 11);
        assert_eq!(usable.date(0), series.date(2));
        assert!(usable.has_wastewater());

        // The hospitalization family ignores wastewater gaps and the channel itself.
        let usable = screen(&series, ModelFamily::HospitalizationOnly, &defaults(), 9).unwrap();
        assert_eq!(usable.len(), 14);
        assert!(!usable.has_wastewater());
    }

    #[test]
    fn disjoint_channels_do_not_overlap() {
        let hosp = [0.1, 0.2, 0.3, NAN, NAN, NAN];
        let ww = [NAN, NAN, NAN, 5.0, 5.1, 5.2];
        let series = dual_series(&hosp, &ww);
        assert_eq!(
            screen(&series, ModelFamily::HospitalizationWastewater, &defaults(), 2).unwrap_err(),
            SkipReason::NoOverlap
        );

        let single = single_series(&rising(12));
        assert_eq!(
            screen(&single, ModelFamily::HospitalizationWastewater, &defaults(), 9).unwrap_err(),
            SkipReason::NoOverlap
        );
    }

    #[test]
    fn flat_channels_are_degenerate() {
        let flat = single_series(&[0.2; 12]);
        assert_eq!(
            screen(&flat, ModelFamily::HospitalizationOnly, &defaults(), 9).unwrap_err(),
            SkipReason::DegenerateSeries {
                channel: Channel::Hospitalization
            }
        );
        // The baseline has nothing to fit and still runs.
        assert!(screen(&flat, ModelFamily::Naive, &defaults(), 9).is_ok());

        let series = dual_series(&rising(12), &[6.0; 12]);
        assert_eq!(
            screen(&series, ModelFamily::HospitalizationWastewater, &defaults(), 9).unwrap_err(),
            SkipReason::DegenerateSeries {
                channel: Channel::Wastewater
            }
        );
    }

    #[test]
    fn history_must_reach_the_first_forecastable_origin() {
        let series = single_series(&rising(10));

        let late_start = PipelineSettings {
            schedule: RollingSchedule::new(10, 1).unwrap(),
            ..defaults()
        };
        for family in [ModelFamily::HospitalizationOnly, ModelFamily::Naive] {
            assert_eq!(
                screen(&series, family, &late_start, 9).unwrap_err(),
                SkipReason::InsufficientHistory {
                    observations: 10,
                    required: 12
                }
            );
        }

        let long_horizon = PipelineSettings {
            horizon: 3,
            ..defaults()
        };
        let short = single_series(&rising(9));
        assert_eq!(
            screen(&short, ModelFamily::HospitalizationOnly, &long_horizon, 9).unwrap_err(),
            SkipReason::InsufficientHistory {
                observations: 9,
                required: 10
            }
        );
        assert_eq!(
            screen(&series, ModelFamily::HospitalizationOnly, &long_horizon, 9)
                .unwrap()
                .len(),
            10
        );
    }
}
