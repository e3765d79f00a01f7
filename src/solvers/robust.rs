//! Robust geographically weighted regression.
//!
//! Outlying observations are down-weighted before the final fit. The
//! observation weights multiply the spatial weights of every local model.

use super::gwr::{fit_final, predict_coefficients, GwrRegressor, GwrRegressorBuilder};
use super::local::{fit_coefficients, fit_with_hat};
use super::traits::{FittedSpatialRegressor, GwrError, SpatialRegressor};
use crate::core::{BandwidthCriterion, Executor, GwrOptions, GwrResult, ProgressSink};
use crate::diagnostics::{diagnostic_from_rss, residual_outliers, robust_weight, studentized_residuals};
use crate::inference::residual_variance;
use crate::spatial::{Locations, SpatialWeight};
use crate::utils::fitted_values;
use faer::{Col, Mat};
use std::sync::Arc;

/// Studentized residuals beyond this magnitude are filtered out.
const OUTLIER_THRESHOLD: f64 = 3.0;

/// Robust GWR estimator.
///
/// In filtered mode, observations with an absolute studentized residual
/// above 3 get weight 0 and the model is refitted once. Otherwise weights
/// are updated iteratively from standardized residuals until the mean
/// squared error stabilizes.
#[derive(Debug, Clone)]
pub struct RobustGwrRegressor {
    base: GwrRegressor,
    filtered: bool,
    max_iterations: usize,
    tolerance: f64,
}

impl RobustGwrRegressor {
    pub fn builder() -> RobustGwrRegressorBuilder {
        RobustGwrRegressorBuilder::default()
    }

    pub fn filtered(&self) -> bool {
        self.filtered
    }

    fn filtered_weights(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        sw: &SpatialWeight,
    ) -> Result<Col<f64>, GwrError> {
        let hat = fit_with_hat(self.base.executor(), x, y, sw, None, false)?;
        let fitted = fitted_values(x, &hat.betas);
        let residuals = Col::from_fn(y.nrows(), |i| y[i] - fitted[i]);
        let rss: f64 = residuals.iter().map(|r| r * r).sum();
        let diagnostic = diagnostic_from_rss(y, rss, &hat.shat);
        let sigma2 = residual_variance(rss, diagnostic.edf);
        let studentized = studentized_residuals(&residuals, &hat.q_diag, sigma2);

        let outliers = residual_outliers(&studentized, OUTLIER_THRESHOLD);
        self.base.reporter().info(
            "robust gwr",
            &format!("{} observations filtered out", outliers.len()),
        );
        let mut weights = Col::from_fn(y.nrows(), |_| 1.0);
        for i in outliers {
            weights[i] = 0.0;
        }
        Ok(weights)
    }

    fn iterative_weights(
        &self,
        x: &Mat<f64>,
        y: &Col<f64>,
        sw: &SpatialWeight,
    ) -> Result<(Col<f64>, usize), GwrError> {
        let n = y.nrows();
        let exec = self.base.executor();
        let residuals_of = |betas: &Mat<f64>| {
            let fitted = fitted_values(x, betas);
            Col::from_fn(n, |i| y[i] - fitted[i])
        };
        let mse_of = |res: &Col<f64>| res.iter().map(|r| r * r).sum::<f64>() / n as f64;

        let mut residuals = residuals_of(&fit_coefficients(exec, x, y, sw, None)?);
        let mut mse = mse_of(&residuals);
        let mut weights = Col::from_fn(n, |_| 1.0);
        let mut iterations = 0;

        while iterations < self.max_iterations && mse > 0.0 {
            let scale = mse.sqrt();
            weights = Col::from_fn(n, |i| robust_weight(residuals[i] / scale));
            residuals = residuals_of(&fit_coefficients(exec, x, y, sw, Some(&weights))?);
            let new_mse = mse_of(&residuals);
            let change = (mse - new_mse).abs() / new_mse;
            mse = new_mse;
            iterations += 1;
            self.base.reporter().debug(
                "robust gwr",
                &format!("iteration {iterations}: mse {mse}, relative change {change}"),
            );
            self.base.reporter().progress(iterations, self.max_iterations);
            if change.is_nan() || change <= self.tolerance {
                break;
            }
        }
        Ok((weights, iterations))
    }
}

impl SpatialRegressor for RobustGwrRegressor {
    type Fitted = FittedRobustGwr;

    fn fit(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Self::Fitted, GwrError> {
        let calibration = self.base.calibrate(locations, x, y)?;
        let design = &calibration.x;
        let sw = &calibration.spatial_weight;

        let (weights, iterations) = if self.filtered {
            (self.filtered_weights(design, y, sw)?, 1)
        } else {
            self.iterative_weights(design, y, sw)?
        };

        let result = fit_final(
            self.base.executor(),
            self.base.options(),
            design,
            y,
            sw,
            Some(&weights),
        )?;

        Ok(FittedRobustGwr {
            result,
            locations: locations.clone(),
            x: calibration.x,
            y: y.to_owned(),
            spatial_weight: calibration.spatial_weight,
            bandwidth_criteria: calibration.bandwidth_criteria,
            robust_weights: weights,
            iterations,
            executor: self.base.executor().clone(),
        })
    }
}

/// A fitted robust GWR model.
#[derive(Debug, Clone)]
pub struct FittedRobustGwr {
    result: GwrResult,
    locations: Locations,
    x: Mat<f64>,
    y: Col<f64>,
    spatial_weight: SpatialWeight,
    bandwidth_criteria: Vec<(f64, f64)>,
    robust_weights: Col<f64>,
    iterations: usize,
    executor: Executor,
}

impl FittedRobustGwr {
    /// Final observation weights in `[0, 1]`.
    pub fn robust_weights(&self) -> &Col<f64> {
        &self.robust_weights
    }

    /// Reweighting iterations performed (1 in filtered mode).
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn spatial_weight(&self) -> &SpatialWeight {
        &self.spatial_weight
    }

    pub fn bandwidth_criterion_list(&self) -> &[(f64, f64)] {
        &self.bandwidth_criteria
    }
}

impl FittedSpatialRegressor for FittedRobustGwr {
    fn result(&self) -> &GwrResult {
        &self.result
    }

    fn predict(&self, locations: &Locations) -> Result<Mat<f64>, GwrError> {
        predict_coefficients(
            &self.executor,
            &self.spatial_weight,
            &self.locations,
            locations,
            &self.x,
            &self.y,
            Some(&self.robust_weights),
        )
    }
}

/// Builder for `RobustGwrRegressor`.
pub struct RobustGwrRegressorBuilder {
    base: GwrRegressorBuilder,
    filtered: bool,
    max_iterations: usize,
    tolerance: f64,
}

impl Default for RobustGwrRegressorBuilder {
    fn default() -> Self {
        Self {
            base: GwrRegressorBuilder::default(),
            filtered: false,
            max_iterations: 20,
            tolerance: 1e-5,
        }
    }
}

impl RobustGwrRegressorBuilder {
    pub fn options(mut self, options: GwrOptions) -> Self {
        self.base = self.base.options(options);
        self
    }

    pub fn with_intercept(mut self, include: bool) -> Self {
        self.base = self.base.with_intercept(include);
        self
    }

    pub fn hat_matrix(mut self, enabled: bool) -> Self {
        self.base = self.base.hat_matrix(enabled);
        self
    }

    pub fn spatial_weight(mut self, spatial_weight: SpatialWeight) -> Self {
        self.base = self.base.spatial_weight(spatial_weight);
        self
    }

    pub fn autoselect_bandwidth(mut self, criterion: BandwidthCriterion) -> Self {
        self.base = self.base.autoselect_bandwidth(criterion);
        self
    }

    pub fn autoselect_variables(mut self, threshold: f64) -> Self {
        self.base = self.base.autoselect_variables(threshold);
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.base = self.base.progress_sink(sink);
        self
    }

    /// Filter outliers once instead of reweighting iteratively.
    pub fn filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }

    /// Iteration cap of the reweighting loop (default: 20).
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Relative MSE change below which reweighting stops (default: 1e-5).
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn build(self) -> Result<RobustGwrRegressor, GwrError> {
        if self.max_iterations < 1 {
            return Err(crate::core::OptionsError::InvalidMaxIterations(self.max_iterations).into());
        }
        if self.tolerance.is_nan() || self.tolerance <= 0.0 {
            return Err(crate::core::OptionsError::InvalidTolerance(self.tolerance).into());
        }
        Ok(RobustGwrRegressor {
            base: self.base.build()?,
            filtered: self.filtered,
            max_iterations: self.max_iterations,
            tolerance: self.tolerance,
        })
    }
}
