use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate};
use hospcast::forecast::inverter::invert_differencing;
use hospcast::forecast::lags::{LagSpec, build_lagged_table};
use hospcast::forecast::metrics::one_step_errors;
use hospcast::forecast::pipeline::{ModelFamily, PipelineSettings, evaluate_family};
use hospcast::forecast::predictor::predict_multi_step;
use hospcast::forecast::regression::{FitError, QuantileModel, QuantileRegressor};
use hospcast::forecast::trainer::{RollingSchedule, train_rolling_origin};
use hospcast::forecast::types::TimeSeries;
use ndarray::{ArrayView1, ArrayView2};

const SERIES: [f64; 10] = [10.0, 11.0, 13.0, 12.0, 14.0, 16.0, 15.0, 17.0, 19.0, 18.0];

#[derive(Debug, Clone, Copy)]
struct ConstantModel(f64);

impl QuantileModel for ConstantModel {
    fn predict(&self, _: ArrayView1<f64>) -> f64 {
        self.0
    }
}

/// Ignores the data and always predicts the same differenced value.
struct ConstantRegressor(f64);

impl QuantileRegressor for ConstantRegressor {
    type Model = ConstantModel;

    fn fit(
        &self,
        _: ArrayView1<f64>,
        _: ArrayView2<f64>,
        _: f64,
    ) -> Result<ConstantModel, FitError> {
        Ok(ConstantModel(self.0))
    }
}

fn weekly(values: &[f64]) -> TimeSeries {
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    let dates = (0..values.len())
        .map(|i| start + Duration::weeks(i as i64))
        .collect();
    TimeSeries::single(dates, values.to_vec()).unwrap()
}

#[test]
fn ten_week_series_walks_through_every_stage() {
    let series = weekly(&SERIES);
    let spec = LagSpec::single(vec![1, 2], 1).unwrap();
    let schedule = RollingSchedule::new(7, 1).unwrap();

    let table = build_lagged_table(&series, &spec).unwrap();
    assert_eq!(table.n_rows(), 10 - 1 - 2);

    let regressor = ConstantRegressor(0.5);
    let records = train_rolling_origin(&series, &spec, &schedule, 2, &regressor, 0.5).unwrap();
    let origins: Vec<usize> = records.iter().map(|r| r.training_cutoff_index).collect();
    assert_eq!(origins, vec![7, 8]);

    let predictions = predict_multi_step(&records, &series, &spec, 2, "hosp").unwrap();
    assert_eq!(predictions.len(), 4);
    assert!(predictions.overrun_origins.is_empty());
    assert_eq!(predictions.rows[0].model_name, "hosp@7");
    assert_eq!(predictions.rows[2].model_name, "hosp@8");

    let reconstructed = invert_differencing(&predictions, &series, 1).unwrap();
    let levels: Vec<f64> = reconstructed.iter().map(|r| r.original_scale_prediction).collect();
    // Anchors are y[6] = 15 and y[7] = 17.
    assert_eq!(levels, vec![15.5, 16.0, 17.5, 18.0]);

    let errors = one_step_errors(&reconstructed);
    assert_eq!(errors.len(), 2);
    assert_abs_diff_eq!(errors[0].absolute_error, 1.5);
    assert_abs_diff_eq!(errors[1].absolute_error, 1.5);
    assert_eq!(errors[0].date, series.dates()[7]);
    assert_eq!(errors[1].date, series.dates()[8]);
}

#[test]
fn one_error_row_per_kept_origin_for_any_schedule() {
    let values: Vec<f64> = (0..30).map(|i| 100.0 + f64::from(i % 7) * 3.0 - f64::from(i)).collect();
    let series = weekly(&values);
    let spec = LagSpec::single(vec![1, 3], 1).unwrap();

    for (start, increment, horizon) in [(7, 1, 1), (7, 2, 2), (10, 3, 4), (5, 1, 3)] {
        let schedule = RollingSchedule::new(start, increment).unwrap();
        let regressor = ConstantRegressor(0.0);
        let records =
            train_rolling_origin(&series, &spec, &schedule, horizon, &regressor, 0.5).unwrap();
        let predictions = predict_multi_step(&records, &series, &spec, horizon, "hosp").unwrap();
        let case = format!("start {start}, increment {increment}, horizon {horizon}");

        // Every trained origin fits its horizon, and the next one would not.
        assert!(predictions.overrun_origins.is_empty(), "{case}");
        let last = records.last().unwrap().training_cutoff_index;
        assert!(last + horizon <= series.len(), "{case}");
        assert!(last + increment + horizon > series.len(), "{case}");

        assert_eq!(predictions.len(), records.len() * horizon);
        let errors = one_step_errors(&invert_differencing(&predictions, &series, 1).unwrap());
        assert_eq!(errors.len(), records.len(), "{case}");
    }
}

#[test]
fn pipeline_with_constant_regressor_matches_manual_stages() {
    let series = weekly(&SERIES);
    let settings = PipelineSettings {
        hospitalization_lags: vec![1, 2],
        wastewater_lags: vec![2],
        differencing_order: 1,
        schedule: RollingSchedule::new(7, 1).unwrap(),
        horizon: 2,
        quantile: 0.5,
    };
    let evaluation = evaluate_family(
        &series,
        ModelFamily::HospitalizationOnly,
        &settings,
        &ConstantRegressor(0.5),
    )
    .unwrap();

    assert_eq!(evaluation.models_fitted, 2);
    assert_eq!(evaluation.reconstructed.len(), 4);
    let errors: Vec<f64> = evaluation.errors.iter().map(|e| e.absolute_error).collect();
    assert_eq!(errors, vec![1.5, 1.5]);

    let naive =
        evaluate_family(&series, ModelFamily::Naive, &settings, &ConstantRegressor(0.5)).unwrap();
    let naive_errors: Vec<f64> = naive.errors.iter().map(|e| e.absolute_error).collect();
    assert_eq!(naive_errors, vec![2.0, 2.0]);
}
