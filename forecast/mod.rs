//! # Forecasting Core
//!
//! Rolling-origin quantile-regression forecasting on differenced weekly series.
//! The stages, leaf first:
//!
//! - [`lags`]: differencing and lag feature tables.
//! - [`regression`]: the quantile regression capability and its IRLS solver.
//! - [`trainer`]: one fitted model per rolling origin.
//! - [`window`]: the synthetic lag window used for recursive forecasting.
//! - [`predictor`]: multi-step forecasts in the differenced scale.
//! - [`inverter`]: back to the original scale.
//! - [`metrics`]: one-step errors and the naive baseline.
//! - [`pipeline`]: the stages chained for one series and one model family.

pub mod inverter;
pub mod lags;
pub mod metrics;
pub mod pipeline;
pub mod predictor;
pub mod regression;
pub mod trainer;
pub mod types;
pub mod window;

pub use pipeline::{FamilyEvaluation, ForecastError, ModelFamily, PipelineSettings, evaluate_family};
pub use regression::{IrlsQuantileRegressor, QuantileModel, QuantileRegressor};
pub use types::{Channel, TimeSeries};
