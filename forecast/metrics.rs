//! One-step-ahead absolute errors; missing values propagate, summaries skip them.

use crate::forecast::inverter::ReconstructedPredictionRow;
use crate::forecast::trainer::RollingSchedule;
use crate::forecast::types::TimeSeries;
use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ErrorRow {
    pub date: NaiveDate,
    pub absolute_error: f64,
}

/// `|prediction - actual|` for every first-step row.
pub fn one_step_errors(rows: &[ReconstructedPredictionRow]) -> Vec<ErrorRow> {
    rows.iter()
        .filter(|row| row.forecast.horizon_step == 1)
        .map(|row| ErrorRow {
            date: row.forecast.date,
            absolute_error: (row.original_scale_prediction - row.original_scale_actual).abs(),
        })
        .collect()
}

/// Errors of the last-value-carried-forward forecast over the same origins and
/// horizon rule as the model families: `|y[k] - y[k - 1]|` dated at `k`.
pub fn naive_baseline_errors(
    series: &TimeSeries,
    schedule: &RollingSchedule,
    horizon: usize,
) -> Vec<ErrorRow> {
    let n = series.len();
    let values = series.hospitalization();
    schedule
        .origins(n, horizon)
        .into_iter()
        .map(|k| ErrorRow {
            date: series.dates()[k],
            absolute_error: (values[k] - values[k - 1]).abs(),
        })
        .collect()
}

/// Mean of the finite errors, or `None` when there are none.
pub fn mean_absolute_error(errors: &[ErrorRow]) -> Option<f64> {
    let (sum, count) = errors
        .iter()
        .map(|e| e.absolute_error)
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::predictor::PredictionRow;
    use crate::forecast::types::test_support::{single_series, weekly_dates};
    use approx::assert_abs_diff_eq;

    const SERIES: [f64; 10] = [10.0, 11.0, 13.0, 12.0, 14.0, 16.0, 15.0, 17.0, 19.0, 18.0];

    fn reconstructed(
        step: usize,
        time_index: usize,
        prediction: f64,
        actual: f64,
    ) -> ReconstructedPredictionRow {
        ReconstructedPredictionRow {
            forecast: PredictionRow {
                model_name: "hosp@7".to_string(),
                date: weekly_dates(time_index + 1)[time_index],
                time_index,
                horizon_step: step,
                prediction: 0.0,
            },
            original_scale_prediction: prediction,
            original_scale_actual: actual,
        }
    }

    #[test]
    fn only_first_steps_are_scored() {
        let rows = vec![
            reconstructed(1, 7, 15.5, 17.0),
            reconstructed(2, 8, 16.0, 19.0),
            reconstructed(1, 8, 17.5, 19.0),
            reconstructed(2, 9, 18.0, 18.0),
        ];
        let errors = one_step_errors(&rows);
        assert_eq!(errors.len(), 2);
        assert_abs_diff_eq!(errors[0].absolute_error, 1.5);
        assert_abs_diff_eq!(errors[1].absolute_error, 1.5);
        assert_eq!(errors[1].date, weekly_dates(9)[8]);
    }

    #[test]
    fn missing_actuals_propagate() {
        let errors = one_step_errors(&[reconstructed(1, 3, 1.0, f64::NAN)]);
        assert!(errors[0].absolute_error.is_nan());
        assert_eq!(mean_absolute_error(&errors), None);
    }

    #[test]
    fn naive_baseline_uses_the_model_origins() {
        let series = single_series(&SERIES);
        let schedule = RollingSchedule::new(7, 1).unwrap();
        let errors = naive_baseline_errors(&series, &schedule, 2);
        assert_eq!(errors.len(), 2);
        assert_abs_diff_eq!(errors[0].absolute_error, 2.0);
        assert_abs_diff_eq!(errors[1].absolute_error, 2.0);
        assert_eq!(errors[0].date, series.dates()[7]);

        // A longer horizon pushes the last origin out.
        assert_eq!(naive_baseline_errors(&series, &schedule, 3).len(), 1);

        // With one step the last observed week is scored too.
        let one_step = naive_baseline_errors(&series, &schedule, 1);
        assert_eq!(one_step.len(), 3);
        assert_eq!(one_step[2].date, series.dates()[9]);
        assert_abs_diff_eq!(one_step[2].absolute_error, 1.0);
    }

    #[test]
    fn mean_skips_missing_errors() {
        let date = weekly_dates(1)[0];
        let errors = [
            ErrorRow { date, absolute_error: 1.0 },
            ErrorRow { date, absolute_error: f64::NAN },
            ErrorRow { date, absolute_error: 3.0 },
        ];
        assert_eq!(mean_absolute_error(&errors), Some(2.0));
        assert_eq!(mean_absolute_error(&[]), None);
    }
}
