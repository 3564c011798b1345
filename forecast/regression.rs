//! # Quantile Regression Capability
//!
//! The pipeline drives regression fitting through a deliberately narrow pair of
//! traits: a [`QuantileRegressor`] turns a target vector and a feature matrix
//! into a fitted [`QuantileModel`], and the model maps one feature vector to one
//! prediction. Nothing upstream knows about formulas, column names or solver
//! internals.
//!
//! [`IrlsQuantileRegressor`] is the default capability. It minimises the check
//! (pinball) loss of a linear model with intercept by iteratively reweighted
//! least squares:
//!
//! 1.  Start from the ordinary least-squares solution.
//! 2.  Weight every observation by `tau / |r|` (positive residual) or
//!     `(1 - tau) / |r|` (negative residual), with `|r|` floored away from zero.
//! 3.  Solve the weighted normal equations `X'WX beta = X'Wy` and repeat until the
//!     largest coefficient change falls below tolerance.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, s};
use ndarray_linalg::Solve;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Residual magnitudes below this value are clamped before reweighting so that
/// observations sitting on the fit do not produce infinite weights.
const RESIDUAL_FLOOR: f64 = 1e-6;

/// Failures of a single regression fit.
#[derive(Error, Debug)]
pub enum FitError {
    #[error("The quantile level must lie strictly between 0 and 1, but {0} was given.")]
    InvalidQuantile(f64),

    #[error("The target has {target} rows, but the feature matrix has {features}.")]
    DimensionMismatch { target: usize, features: usize },

    #[error("Only {rows} complete rows are available to estimate {parameters} coefficients.")]
    InsufficientRows { rows: usize, parameters: usize },

    #[error("Fitting requires complete data, but non-finite values were found in the {0}.")]
    NonFiniteInput(&'static str),

    #[error("The weighted normal equations could not be solved; the design is likely rank deficient. Error: {0}")]
    SingularSystem(#[from] ndarray_linalg::error::LinalgError),

    #[error("The fit produced non-finite coefficients at iteration {iteration}.")]
    NonFiniteCoefficients { iteration: usize },
}

/// A fitted model that maps one feature vector to a point prediction.
pub trait QuantileModel: Send + Sync + fmt::Debug {
    fn predict(&self, features: ArrayView1<f64>) -> f64;
}

/// A regression-fitting capability.
///
/// Implementations must be usable from several threads at once; the trainer
/// fits independent rolling origins in parallel.
pub trait QuantileRegressor: Send + Sync {
    type Model: QuantileModel;

    fn fit(
        &self,
        target: ArrayView1<f64>,
        features: ArrayView2<f64>,
        quantile: f64,
    ) -> Result<Self::Model, FitError>;
}

/// The check loss `rho_tau(r)` summed over residuals.
pub fn pinball_loss(residuals: ArrayView1<f64>, quantile: f64) -> f64 {
    residuals
        .iter()
        .map(|&r| if r >= 0.0 { quantile * r } else { (quantile - 1.0) * r })
        .sum()
}

/// A linear quantile model `intercept + coefficients . x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearQuantileModel {
    pub intercept: f64,
    pub coefficients: Array1<f64>,
    pub quantile: f64,
}

impl QuantileModel for LinearQuantileModel {
    fn predict(&self, features: ArrayView1<f64>) -> f64 {
        self.intercept + self.coefficients.dot(&features)
    }
}

/// Iteratively reweighted least squares solver for linear quantile regression.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IrlsQuantileRegressor {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for IrlsQuantileRegressor {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

impl QuantileRegressor for IrlsQuantileRegressor {
    type Model = LinearQuantileModel;

    fn fit(
        &self,
        target: ArrayView1<f64>,
        features: ArrayView2<f64>,
        quantile: f64,
    ) -> Result<LinearQuantileModel, FitError> {
        // --- 1. Validate Inputs ---
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(FitError::InvalidQuantile(quantile));
        }
        if target.len() != features.nrows() {
            return Err(FitError::DimensionMismatch {
                target: target.len(),
                features: features.nrows(),
            });
        }
        let parameters = features.ncols() + 1;
        if target.len() < parameters {
            return Err(FitError::InsufficientRows {
                rows: target.len(),
                parameters,
            });
        }
        if target.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteInput("target"));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFiniteInput("features"));
        }

        // --- 2. Design Matrix With Intercept ---
        let n = target.len();
        let mut x = Array2::<f64>::ones((n, parameters));
        x.slice_mut(s![.., 1..]).assign(&features);

        // --- 3. Reweighting Loop ---
        let mut beta = solve_weighted(&x, target, &Array1::ones(n))?;
        let mut converged = false;

        for iter in 1..=self.max_iterations {
            let residuals = &target - &x.dot(&beta);
            let weights = residuals.mapv(|r| {
                let side = if r >= 0.0 { quantile } else { 1.0 - quantile };
                side / r.abs().max(RESIDUAL_FLOOR)
            });

            let beta_next = solve_weighted(&x, target, &weights)?;
            if beta_next.iter().any(|b| !b.is_finite()) {
                return Err(FitError::NonFiniteCoefficients { iteration: iter });
            }

            let change = (&beta_next - &beta)
                .iter()
                .fold(0.0_f64, |acc, d| acc.max(d.abs()));
            let scale = beta_next.iter().fold(1.0_f64, |acc, b| acc.max(b.abs()));
            beta = beta_next;

            log::trace!("IRLS iteration {iter}: max coefficient change {change:.3e}");
            if change <= self.tolerance * scale {
                converged = true;
                break;
            }
        }

        if !converged {
            log::debug!(
                "IRLS reached {} iterations without meeting tolerance {:.1e}; keeping the last iterate.",
                self.max_iterations,
                self.tolerance
            );
        }

        let residuals = &target - &x.dot(&beta);
        log::trace!(
            "Quantile fit on {n} rows finished with check loss {:.6}",
            pinball_loss(residuals.view(), quantile)
        );

        Ok(LinearQuantileModel {
            intercept: beta[0],
            coefficients: beta.slice(s![1..]).to_owned(),
            quantile,
        })
    }
}

/// Solves `X'WX beta = X'Wy`.
fn solve_weighted(
    x: &Array2<f64>,
    y: ArrayView1<f64>,
    weights: &Array1<f64>,
) -> Result<Array1<f64>, FitError> {
    let xw = x * &weights.view().insert_axis(Axis(1));
    let xtwx = xw.t().dot(x);
    let xtwy = xw.t().dot(&y);
    Ok(xtwx.solve_into(xtwy)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, array};

    fn column(values: &[f64]) -> Array2<f64> {
        Array2::from_shape_vec((values.len(), 1), values.to_vec()).unwrap()
    }

    #[test]
    fn recovers_an_exact_line() {
        let x: Vec<f64> = (0..12).map(f64::from).collect();
        let y: Array1<f64> = x.iter().map(|v| 1.0 + 2.0 * v).collect();
        let model = IrlsQuantileRegressor::default()
            .fit(y.view(), column(&x).view(), 0.5)
            .unwrap();

        assert_abs_diff_eq!(model.intercept, 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(model.coefficients[0], 2.0, epsilon = 1e-4);
        assert_abs_diff_eq!(model.predict(array![20.0].view()), 41.0, epsilon = 1e-3);
    }

    #[test]
    fn median_fit_ignores_a_single_outlier() {
        let x: Vec<f64> = (0..15).map(f64::from).collect();
        let mut y: Array1<f64> = x.iter().map(|v| 3.0 + 0.5 * v).collect();
        y[7] = 500.0;

        let regressor = IrlsQuantileRegressor {
            max_iterations: 500,
            tolerance: 1e-10,
        };
        let model = regressor.fit(y.view(), column(&x).view(), 0.5).unwrap();

        assert_abs_diff_eq!(model.coefficients[0], 0.5, epsilon = 1e-2);
        assert_abs_diff_eq!(model.intercept, 3.0, epsilon = 1e-1);
    }

    #[test]
    fn upper_quantile_sits_above_the_median() {
        let x: Vec<f64> = (0..40).map(|i| f64::from(i % 10)).collect();
        let y: Array1<f64> = x
            .iter()
            .enumerate()
            .map(|(i, v)| v + if i % 2 == 0 { 1.0 } else { -1.0 } * (i % 7) as f64)
            .collect();
        let regressor = IrlsQuantileRegressor::default();
        let median = regressor.fit(y.view(), column(&x).view(), 0.5).unwrap();
        let upper = regressor.fit(y.view(), column(&x).view(), 0.9).unwrap();

        let at = array![4.5];
        assert!(upper.predict(at.view()) > median.predict(at.view()));
    }

    #[test]
    fn rejects_too_few_rows() {
        let err = IrlsQuantileRegressor::default()
            .fit(array![1.0, 2.0].view(), Array2::zeros((2, 2)).view(), 0.5)
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::InsufficientRows {
                rows: 2,
                parameters: 3
            }
        ));
    }

    #[test]
    fn rejects_invalid_quantile_and_missing_values() {
        let regressor = IrlsQuantileRegressor::default();
        let x = column(&[1.0, 2.0, 3.0]);
        assert!(matches!(
            regressor.fit(array![1.0, 2.0, 3.0].view(), x.view(), 1.0),
            Err(FitError::InvalidQuantile(_))
        ));
        assert!(matches!(
            regressor.fit(array![1.0, f64::NAN, 3.0].view(), x.view(), 0.5),
            Err(FitError::NonFiniteInput("target"))
        ));
    }

    #[test]
    fn constant_zero_feature_is_rank_deficient() {
        let y = array![1.0, 2.0, 0.5, 3.0, 1.5];
        let x = Array2::zeros((5, 1));
        let err = IrlsQuantileRegressor::default()
            .fit(y.view(), x.view(), 0.5)
            .unwrap_err();
        assert!(matches!(err, FitError::SingularSystem(_)));
    }

    #[test]
    fn pinball_loss_is_asymmetric() {
        let residuals = array![2.0, -2.0];
        assert_abs_diff_eq!(pinball_loss(residuals.view(), 0.5), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pinball_loss(residuals.view(), 0.9), 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pinball_loss(array![2.0].view(), 0.9), 1.8, epsilon = 1e-12);
    }
}
