//! Multiscale geographically weighted regression.
//!
//! Every coefficient gets its own bandwidth. After an initial fit with one
//! shared bandwidth, backfitting cycles through the variables: it rebuilds
//! the partial residual of variable k, reselects its bandwidth unless frozen,
//! refits its coefficient surface by a one-column local regression and
//! updates the residual. Cycles repeat until the change of the residual sum
//! of squares falls below the threshold.
//!
//! With hat-matrix tracking each variable keeps its n x n projection `C_k`
//! (`beta_k = C_k y`). Its contribution to the hat matrix `S0 = sum_k R_k`
//! is `R_k = diag(x_k) C_k`. After a refit with projection `C` the arrays
//! are updated by
//!
//! ```text
//! A   = R_k - S0
//! C_k = C A + C
//! S0  = diag(x_k) C_k - A
//! ```

use super::gwr::{check_inputs, select_bandwidth};
use super::local::{solve, LocalSystem};
use super::traits::{FitStage, FittedSpatialRegressor, GwrError, SpatialRegressor};
use crate::core::{
    BackfittingCriterion, BackfittingOptions, BandwidthCriterion, Executor, GwrOptions, GwrResult,
    ProgressSink, Reporter, Shat,
};
use crate::diagnostics::{diagnostic_from_rss, studentized_residuals};
use crate::inference::{residual_variance, CoefficientInference};
use crate::spatial::{Locations, SpatialWeight};
use crate::utils::{build_design_matrix, center_column, column_matrix, fitted_values, trace};
use faer::{Col, Mat};
use std::sync::Arc;

/// Initialization status of a per-variable bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandwidthInit {
    /// No usable value: selected before backfitting starts.
    #[default]
    Null,
    /// A starting value that backfitting may still reselect.
    Initial,
    /// Fixed for the whole fit.
    Specified,
}

/// Default threshold on the bandwidth change counted as "stable".
const DEFAULT_BANDWIDTH_THRESHOLD: f64 = 1e-5;

/// Multiscale GWR estimator.
///
/// Per-variable settings are arrays of length p, the number of coefficients
/// including the intercept. Only `spatial_weights` is required; the other
/// arrays default to `Null` initialization, CV selection, centered
/// predictors and a bandwidth threshold of 1e-5.
#[derive(Debug, Clone)]
pub struct MultiscaleGwrRegressor {
    options: GwrOptions,
    backfitting: BackfittingOptions,
    spatial_weights: Vec<SpatialWeight>,
    bandwidth_init: Vec<BandwidthInit>,
    criteria: Vec<BandwidthCriterion>,
    centered: Vec<bool>,
    thresholds: Vec<f64>,
    executor: Executor,
    reporter: Reporter,
}

/// Per-variable state during a fit.
struct VariableSetup {
    spatial_weights: Vec<SpatialWeight>,
    init: Vec<BandwidthInit>,
    criteria: Vec<BandwidthCriterion>,
    thresholds: Vec<f64>,
}

fn expand<T: Clone>(values: &[T], p: usize, default: T, name: &str) -> Result<Vec<T>, GwrError> {
    match values.len() {
        0 => Ok(vec![default; p]),
        len if len == p => Ok(values.to_vec()),
        len => Err(GwrError::config(format!(
            "{name} has {len} entries but the model has {p} coefficients"
        ))),
    }
}

impl MultiscaleGwrRegressor {
    pub fn builder() -> MultiscaleGwrRegressorBuilder {
        MultiscaleGwrRegressorBuilder::default()
    }

    pub fn options(&self) -> &GwrOptions {
        &self.options
    }

    pub fn backfitting_options(&self) -> &BackfittingOptions {
        &self.backfitting
    }

    fn setup(&self, p: usize) -> Result<VariableSetup, GwrError> {
        if self.spatial_weights.len() != p {
            return Err(GwrError::config(format!(
                "spatial weights has {} entries but the model has {p} coefficients",
                self.spatial_weights.len()
            )));
        }
        let init = expand(&self.bandwidth_init, p, BandwidthInit::Null, "bandwidth initialization")?;
        let criteria = expand(&self.criteria, p, BandwidthCriterion::Cv, "bandwidth criteria")?;
        let thresholds = expand(
            &self.thresholds,
            p,
            DEFAULT_BANDWIDTH_THRESHOLD,
            "bandwidth thresholds",
        )?;
        expand(&self.centered, p, true, "predictor centering")?;

        for (k, sw) in self.spatial_weights.iter().enumerate() {
            let weight = sw.bandwidth()?;
            if init[k] != BandwidthInit::Null {
                let invalid = if weight.adaptive {
                    weight.bandwidth <= 1.0
                } else {
                    weight.bandwidth < 0.0
                };
                if invalid {
                    return Err(GwrError::config(format!(
                        "variable {k} has an invalid initial bandwidth {}",
                        weight.bandwidth
                    )));
                }
            }
        }

        Ok(VariableSetup {
            spatial_weights: self.spatial_weights.clone(),
            init,
            criteria,
            thresholds,
        })
    }

    fn centered(&self, k: usize) -> bool {
        self.centered.get(k).copied().unwrap_or(true)
    }

    /// Bandwidth search interval used by backfitting.
    ///
    /// `max_distance` is the largest distance of a bound fixed-bandwidth
    /// weight; it is computed once per fit and ignored for adaptive weights.
    fn bounds(
        &self,
        sw: &SpatialWeight,
        n: usize,
        max_distance: Option<f64>,
        fixed_lower_fraction: bool,
    ) -> Result<(f64, f64), GwrError> {
        let weight = sw.bandwidth()?;
        if weight.adaptive {
            return Ok((self.backfitting.adaptive_lower.min(n) as f64, n as f64));
        }
        let max = match max_distance {
            Some(max) => max,
            None => sw.max_distance()?,
        };
        let lower = if fixed_lower_fraction { max / 5000.0 } else { 0.0 };
        Ok((lower, max))
    }

    fn select(
        &self,
        crit: BandwidthCriterion,
        x: &Mat<f64>,
        y: &Col<f64>,
        sw: &SpatialWeight,
        bounds: (f64, f64),
    ) -> Result<(f64, Vec<(f64, f64)>), GwrError> {
        select_bandwidth(
            &self.executor,
            &self.reporter,
            &self.options,
            crit,
            x,
            y,
            sw,
            None,
            bounds.0,
            bounds.1,
        )
    }
}

/// Output of the initial fit with the shared bandwidth.
struct InitialFit {
    betas: Mat<f64>,
    /// `S0` (n x n).
    s0: Option<Mat<f64>>,
    /// `C_k` per variable.
    c: Vec<Mat<f64>>,
}

fn initial_fit(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    with_hat: bool,
) -> Result<InitialFit, GwrError> {
    let n = x.nrows();
    let p = x.ncols();
    let rows = exec
        .map(n, |i| {
            let w = sw.weight_vector(i)?;
            let system = LocalSystem::assemble(x, y, &w, i)?;
            let beta = system.beta();
            if beta.iter().any(|b| !b.is_finite()) {
                return Err(GwrError::NonFiniteResult {
                    stage: FitStage::Backfitting,
                    location: Some(i),
                });
            }
            Ok((beta, with_hat.then(|| system.projection())))
        })
        .map_err(|e| e.at_stage(FitStage::Backfitting))?;

    let betas = Mat::from_fn(n, p, |i, j| rows[i].0[j]);
    if !with_hat {
        return Ok(InitialFit {
            betas,
            s0: None,
            c: Vec::new(),
        });
    }

    let mut s0 = Mat::zeros(n, n);
    let mut c: Vec<Mat<f64>> = (0..p).map(|_| Mat::zeros(n, n)).collect();
    for (i, (_, projection)) in rows.iter().enumerate() {
        let Some(projection) = projection else { continue };
        for k in 0..p {
            for j in 0..n {
                c[k][(i, j)] = projection[(k, j)];
                s0[(i, j)] += x[(i, k)] * projection[(k, j)];
            }
        }
    }
    Ok(InitialFit {
        betas,
        s0: Some(s0),
        c,
    })
}

/// One-column local regression of `yi` on `xk` at every location.
///
/// With `with_hat` also returns the projection whose row i is
/// `(xk' W_i xk)^-1 xk' W_i`.
fn fit_variable(
    exec: &Executor,
    xk: &Mat<f64>,
    yi: &Col<f64>,
    sw: &SpatialWeight,
    with_hat: bool,
) -> Result<(Col<f64>, Option<Mat<f64>>), GwrError> {
    let n = xk.nrows();
    let rows = exec
        .map(n, |i| {
            let w = sw.weight_vector(i)?;
            let system = LocalSystem::assemble(xk, yi, &w, i)?;
            let beta = system.beta()[0];
            if !beta.is_finite() {
                return Err(GwrError::NonFiniteResult {
                    stage: FitStage::Backfitting,
                    location: Some(i),
                });
            }
            Ok((beta, with_hat.then(|| system.projection())))
        })
        .map_err(|e| e.at_stage(FitStage::Backfitting))?;

    let betas = Col::from_fn(n, |i| rows[i].0);
    let projection = with_hat.then(|| {
        Mat::from_fn(n, n, |i, j| rows[i].1.as_ref().map_or(0.0, |c| c[(0, j)]))
    });
    Ok((betas, projection))
}

fn residuals(x: &Mat<f64>, y: &Col<f64>, betas: &Mat<f64>) -> Col<f64> {
    let fitted = fitted_values(x, betas);
    Col::from_fn(y.nrows(), |i| y[i] - fitted[i])
}

fn sum_of_squares(v: &Col<f64>) -> f64 {
    v.iter().map(|r| r * r).sum()
}

impl SpatialRegressor for MultiscaleGwrRegressor {
    type Fitted = FittedMultiscaleGwr;

    fn fit(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Self::Fitted, GwrError> {
        check_inputs(locations, x, y, self.options.with_intercept)?;
        let n = x.nrows();
        let mut design = build_design_matrix(x, self.options.with_intercept);
        let p = design.ncols();
        let VariableSetup {
            mut spatial_weights,
            mut init,
            criteria,
            thresholds,
        } = self.setup(p)?;

        let with_hat = self.options.has_hat_matrix;
        if with_hat && n >= self.options.store_s_threshold {
            return Err(GwrError::config(format!(
                "hat-matrix tracking needs {p} n x n arrays; n = {n} is above the storage threshold {}",
                self.options.store_s_threshold
            )));
        }
        if n <= p {
            return Err(GwrError::InsufficientObservations {
                needed: p + 1,
                got: n,
            });
        }

        let first = usize::from(self.options.with_intercept);
        let mut means = vec![0.0; p];
        for k in first..p {
            if self.centered(k) {
                means[k] = center_column(&mut design, k);
            }
        }

        for (k, sw) in spatial_weights.iter_mut().enumerate() {
            let weight = *sw.bandwidth()?;
            if weight.adaptive && (init[k] == BandwidthInit::Null || weight.bandwidth > n as f64) {
                sw.set_bandwidth(n as f64)?;
            }
            sw.bind(locations, locations)?;
        }

        let max_distances = spatial_weights
            .iter()
            .map(|sw| -> Result<Option<f64>, GwrError> {
                if sw.bandwidth()?.adaptive {
                    Ok(None)
                } else {
                    sw.max_distance().map(Some)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Bandwidths without a usable value. A failed search keeps n or the
        // largest distance.
        let mut criterion_lists: Vec<Vec<(f64, f64)>> = vec![Vec::new(); p];
        for k in 0..p {
            if init[k] != BandwidthInit::Null {
                continue;
            }
            let xk = column_matrix(&design, k);
            let bounds = self.bounds(&spatial_weights[k], n, max_distances[k], false)?;
            match self.select(criteria[k], &xk, y, &spatial_weights[k], bounds) {
                Ok((bw, list)) => {
                    spatial_weights[k].set_bandwidth(bw)?;
                    criterion_lists[k] = list;
                    self.reporter.info(
                        "multiscale gwr",
                        &format!("variable {k}: initial bandwidth {bw}"),
                    );
                }
                Err(e @ GwrError::OptimizationFailed { .. }) => {
                    spatial_weights[k].set_bandwidth(bounds.1)?;
                    self.reporter.warn(
                        "multiscale gwr",
                        &format!("variable {k}: {e}; starting from bandwidth {}", bounds.1),
                    );
                }
                Err(e) => return Err(e),
            }
        }

        // Shared bandwidth for the initial fit.
        let mut initial_weight = spatial_weights[0].clone();
        let bounds = self.bounds(&initial_weight, n, max_distances[0], true)?;
        let (initial_bandwidth, _) = self
            .select(criteria[0], &design, y, &initial_weight, bounds)
            .map_err(|e| match e {
                GwrError::OptimizationFailed { reason, .. } => GwrError::OptimizationFailed {
                    stage: FitStage::BandwidthSearch,
                    reason: format!("cannot select the initial bandwidth: {reason}"),
                },
                other => other,
            })?;
        initial_weight.set_bandwidth(initial_bandwidth)?;
        self.reporter.info(
            "multiscale gwr",
            &format!("initial shared bandwidth {initial_bandwidth}"),
        );

        let InitialFit {
            mut betas,
            mut s0,
            mut c,
        } = initial_fit(&self.executor, &design, y, &initial_weight, with_hat)?;

        let mut resid = residuals(&design, y, &betas);
        let mut rss0 = sum_of_squares(&resid);
        let mut stable = vec![0usize; p];
        let mut rss_history = Vec::new();
        let mut criterion_history = Vec::new();
        let mut criterion = f64::INFINITY;
        let mut iteration = 0;

        while iteration < self.backfitting.max_iterations
            && criterion > self.backfitting.criterion_threshold
        {
            iteration += 1;
            for k in 0..p {
                let xk = column_matrix(&design, k);
                let yi = Col::from_fn(n, |i| resid[i] + betas[(i, k)] * design[(i, k)]);

                if init[k] != BandwidthInit::Specified {
                    let previous = spatial_weights[k].bandwidth()?.bandwidth;
                    let bounds = self.bounds(&spatial_weights[k], n, max_distances[k], true)?;
                    match self.select(criteria[k], &xk, &yi, &spatial_weights[k], bounds) {
                        Ok((bw, list)) => {
                            if (bw - previous).abs() > thresholds[k] {
                                stable[k] = 0;
                            } else {
                                stable[k] += 1;
                                if stable[k] >= self.backfitting.retry_times {
                                    init[k] = BandwidthInit::Specified;
                                    self.reporter.debug(
                                        "backfitting",
                                        &format!("variable {k}: bandwidth {bw} frozen"),
                                    );
                                }
                            }
                            spatial_weights[k].set_bandwidth(bw)?;
                            criterion_lists[k] = list;
                        }
                        Err(e @ GwrError::OptimizationFailed { .. }) => {
                            self.reporter.warn(
                                "backfitting",
                                &format!("variable {k}: {e}; keeping bandwidth {previous}"),
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }

                let (beta_k, projection) =
                    fit_variable(&self.executor, &xk, &yi, &spatial_weights[k], with_hat)?;
                for i in 0..n {
                    betas[(i, k)] = beta_k[i];
                }
                if let (Some(cv), Some(s0)) = (projection, s0.as_mut()) {
                    let ck = &c[k];
                    let a = Mat::from_fn(n, n, |i, j| design[(i, k)] * ck[(i, j)] - s0[(i, j)]);
                    let updated = &cv * &a + &cv;
                    *s0 = Mat::from_fn(n, n, |i, j| design[(i, k)] * updated[(i, j)] - a[(i, j)]);
                    c[k] = updated;
                }
                resid = residuals(&design, y, &betas);
            }

            let rss1 = sum_of_squares(&resid);
            criterion = match self.backfitting.criterion {
                BackfittingCriterion::Cvr => (rss1 - rss0).abs(),
                BackfittingCriterion::Dcvr => ((rss1 - rss0).abs() / rss1).sqrt(),
            };
            rss0 = rss1;
            rss_history.push(rss1);
            criterion_history.push(criterion);
            self.reporter.info(
                "backfitting",
                &format!("iteration {iteration}: RSS {rss1}, criterion {criterion}"),
            );
            self.reporter
                .progress(iteration, self.backfitting.max_iterations);
        }

        let result = match s0 {
            Some(s0) => {
                multiscale_inference(&design, y, betas, s0, &c, self.options.with_intercept)
            }
            None => {
                let mut result =
                    GwrResult::from_betas(betas, &design, y, self.options.with_intercept);
                result.diagnostic = Some(diagnostic_from_rss(y, result.rss(), &Shat::default()));
                result
            }
        };

        Ok(FittedMultiscaleGwr {
            result,
            locations: locations.clone(),
            x: design,
            y: y.to_owned(),
            means,
            spatial_weights,
            initial_weight,
            bandwidth_init: init,
            criterion_lists,
            rss_history,
            criterion_history,
            iterations: iteration,
            executor: self.executor.clone(),
        })
    }
}

/// Diagnostic and local inference from the backfitted hat matrices.
fn multiscale_inference(
    x: &Mat<f64>,
    y: &Col<f64>,
    betas: Mat<f64>,
    s0: Mat<f64>,
    c: &[Mat<f64>],
    has_intercept: bool,
) -> GwrResult {
    let n = x.nrows();
    let p = x.ncols();
    let sts = s0.transpose() * &s0;
    let shat = Shat::new(trace(&s0), trace(&sts));

    let mut result = GwrResult::from_betas(betas, x, y, has_intercept);
    let diagnostic = diagnostic_from_rss(y, result.rss(), &shat);
    let sigma2 = residual_variance(diagnostic.rss, diagnostic.edf);

    let variance_factors =
        Mat::from_fn(n, p, |i, k| (0..n).map(|j| c[k][(i, j)].powi(2)).sum::<f64>());
    let std_errors = CoefficientInference::standard_errors(&variance_factors, sigma2);
    let t_values = CoefficientInference::t_statistics(&result.betas, &std_errors);
    let p_values = CoefficientInference::p_values(&t_values, diagnostic.edf);

    let q_diag = Col::from_fn(n, |k| {
        (0..n)
            .map(|i| {
                let delta = if i == k { 1.0 } else { 0.0 };
                (delta - s0[(i, k)]).powi(2)
            })
            .sum::<f64>()
    });
    result.studentized_residuals = Some(studentized_residuals(&result.residuals, &q_diag, sigma2));
    result.shat = Some(shat);
    result.hat_matrix = Some(s0);
    result.diagnostic = Some(diagnostic);
    result.std_errors = Some(std_errors);
    result.t_values = Some(t_values);
    result.p_values = Some(p_values);
    result
}

/// A fitted multiscale GWR model.
#[derive(Debug, Clone)]
pub struct FittedMultiscaleGwr {
    result: GwrResult,
    locations: Locations,
    x: Mat<f64>,
    y: Col<f64>,
    means: Vec<f64>,
    spatial_weights: Vec<SpatialWeight>,
    initial_weight: SpatialWeight,
    bandwidth_init: Vec<BandwidthInit>,
    criterion_lists: Vec<Vec<(f64, f64)>>,
    rss_history: Vec<f64>,
    criterion_history: Vec<f64>,
    iterations: usize,
    executor: Executor,
}

impl FittedMultiscaleGwr {
    /// Calibrated spatial weight of every variable.
    pub fn spatial_weights(&self) -> &[SpatialWeight] {
        &self.spatial_weights
    }

    /// Final bandwidth of every variable.
    pub fn bandwidths(&self) -> Vec<f64> {
        self.spatial_weights
            .iter()
            .map(|sw| sw.weight().map_or(f64::NAN, |w| w.bandwidth))
            .collect()
    }

    /// The shared bandwidth of the initial fit.
    pub fn initial_spatial_weight(&self) -> &SpatialWeight {
        &self.initial_weight
    }

    /// Initialization status of every bandwidth after the fit.
    pub fn bandwidth_init(&self) -> &[BandwidthInit] {
        &self.bandwidth_init
    }

    /// Last bandwidth search of variable `k`.
    pub fn bandwidth_criterion_list(&self, k: usize) -> &[(f64, f64)] {
        self.criterion_lists.get(k).map_or(&[], |list| list.as_slice())
    }

    /// Residual sum of squares after every backfitting iteration.
    pub fn rss_history(&self) -> &[f64] {
        &self.rss_history
    }

    /// Convergence criterion after every backfitting iteration.
    pub fn criterion_history(&self) -> &[f64] {
        &self.criterion_history
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Column means removed from centered predictors (0 elsewhere).
    pub fn predictor_means(&self) -> &[f64] {
        &self.means
    }
}

impl FittedSpatialRegressor for FittedMultiscaleGwr {
    fn result(&self) -> &GwrResult {
        &self.result
    }

    /// Each coefficient surface is evaluated at the new locations from its
    /// final partial residual under its own bandwidth.
    fn predict(&self, locations: &Locations) -> Result<Mat<f64>, GwrError> {
        let n = self.x.nrows();
        let p = self.x.ncols();
        let m = locations.len();
        let betas = &self.result.betas;
        let resid = &self.result.residuals;

        let mut out = Mat::zeros(m, p);
        for k in 0..p {
            let rebound = self.spatial_weights[k].rebind_focus(locations, &self.locations)?;
            let xk = column_matrix(&self.x, k);
            let yk = Col::from_fn(n, |i| resid[i] + betas[(i, k)] * self.x[(i, k)]);
            let column = self.executor.map(m, |i| {
                let w = rebound.weight_vector(i)?;
                solve(&xk, &yk, &w, i)
                    .map(|beta| beta[0])
                    .map_err(|e| e.at_stage(FitStage::Prediction))
            })?;
            for (i, value) in column.into_iter().enumerate() {
                out[(i, k)] = value;
            }
        }
        Ok(out)
    }
}

/// Builder for `MultiscaleGwrRegressor`.
#[derive(Default)]
pub struct MultiscaleGwrRegressorBuilder {
    options: GwrOptions,
    backfitting: BackfittingOptions,
    spatial_weights: Vec<SpatialWeight>,
    bandwidth_init: Vec<BandwidthInit>,
    criteria: Vec<BandwidthCriterion>,
    centered: Vec<bool>,
    thresholds: Vec<f64>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl MultiscaleGwrRegressorBuilder {
    pub fn options(mut self, options: GwrOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_intercept(mut self, include: bool) -> Self {
        self.options.with_intercept = include;
        self
    }

    pub fn hat_matrix(mut self, enabled: bool) -> Self {
        self.options.has_hat_matrix = enabled;
        self
    }

    pub fn backfitting(mut self, options: BackfittingOptions) -> Self {
        self.backfitting = options;
        self
    }

    /// One spatial weight per coefficient.
    pub fn spatial_weights(mut self, spatial_weights: Vec<SpatialWeight>) -> Self {
        self.spatial_weights = spatial_weights;
        self
    }

    pub fn bandwidth_init(mut self, init: Vec<BandwidthInit>) -> Self {
        self.bandwidth_init = init;
        self
    }

    pub fn bandwidth_criteria(mut self, criteria: Vec<BandwidthCriterion>) -> Self {
        self.criteria = criteria;
        self
    }

    /// Whether each predictor is centered (ignored for the intercept).
    pub fn predictor_centered(mut self, centered: Vec<bool>) -> Self {
        self.centered = centered;
        self
    }

    /// Bandwidth change below which an iteration counts as stable.
    pub fn bandwidth_thresholds(mut self, thresholds: Vec<f64>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<MultiscaleGwrRegressor, GwrError> {
        self.options.validate()?;
        self.backfitting.validate()?;
        if self.spatial_weights.is_empty() {
            return Err(GwrError::config("no spatial weights given"));
        }
        for sw in &self.spatial_weights {
            if sw.distance().is_none() {
                return Err(GwrError::config("spatial weight has no distance assigned"));
            }
            sw.bandwidth()?;
        }
        let executor = Executor::new(self.options.parallel)?;
        Ok(MultiscaleGwrRegressor {
            options: self.options,
            backfitting: self.backfitting,
            spatial_weights: self.spatial_weights,
            bandwidth_init: self.bandwidth_init,
            criteria: self.criteria,
            centered: self.centered,
            thresholds: self.thresholds,
            executor,
            reporter: Reporter::new(self.sink),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{BandwidthWeight, Distance, KernelFunction};

    fn sw(bw: f64, adaptive: bool) -> SpatialWeight {
        SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::new(bw, adaptive, KernelFunction::Bisquare),
        )
    }

    #[test]
    fn test_expand() {
        assert_eq!(expand::<bool>(&[], 3, true, "x").unwrap(), vec![true; 3]);
        assert_eq!(expand(&[1, 2], 2, 0, "x").unwrap(), vec![1, 2]);
        assert!(matches!(
            expand(&[1, 2], 3, 0, "x"),
            Err(GwrError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_array_length_mismatch() {
        let model = MultiscaleGwrRegressor::builder()
            .spatial_weights(vec![sw(10.0, true), sw(10.0, true)])
            .build()
            .unwrap();
        let loc = Locations::new(Mat::from_fn(20, 2, |i, j| (i * (j + 1)) as f64));
        let x = Mat::from_fn(20, 2, |i, j| ((i * (j + 3)) % 7) as f64);
        let y = Col::from_fn(20, |i| i as f64);
        // Intercept + 2 predictors = 3 coefficients, 2 spatial weights.
        assert!(matches!(
            model.fit(&loc, &x, &y),
            Err(GwrError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_invalid_initial_bandwidth() {
        let model = MultiscaleGwrRegressor::builder()
            .spatial_weights(vec![sw(1.0, true), sw(10.0, true)])
            .bandwidth_init(vec![BandwidthInit::Initial, BandwidthInit::Null])
            .build()
            .unwrap();
        let loc = Locations::new(Mat::from_fn(20, 2, |i, j| (i * (j + 1)) as f64));
        let x = Mat::from_fn(20, 1, |i, _| ((i * 3) % 7) as f64);
        let y = Col::from_fn(20, |i| i as f64);
        assert!(matches!(
            model.fit(&loc, &x, &y),
            Err(GwrError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_hat_matrix_storage_threshold() {
        let options = GwrOptions::builder().store_s_threshold(10).build().unwrap();
        let model = MultiscaleGwrRegressor::builder()
            .options(options)
            .spatial_weights(vec![sw(10.0, true), sw(10.0, true)])
            .build()
            .unwrap();
        let loc = Locations::new(Mat::from_fn(20, 2, |i, j| (i * (j + 1)) as f64));
        let x = Mat::from_fn(20, 1, |i, _| ((i * 3) % 7) as f64);
        let y = Col::from_fn(20, |i| i as f64);
        assert!(matches!(
            model.fit(&loc, &x, &y),
            Err(GwrError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_bounds_reuse_cached_max_distance() {
        let model = MultiscaleGwrRegressor::builder()
            .spatial_weights(vec![sw(2.0, false)])
            .build()
            .unwrap();
        let loc = Locations::new(Mat::from_fn(4, 2, |i, j| if j == 0 { i as f64 } else { 0.0 }));
        let mut fixed = sw(2.0, false);
        fixed.bind(&loc, &loc).unwrap();

        let (lower, upper) = model.bounds(&fixed, 4, Some(100.0), true).unwrap();
        assert!((lower - 0.02).abs() < 1e-12);
        assert_eq!(upper, 100.0);

        assert_eq!(model.bounds(&fixed, 4, None, false).unwrap(), (0.0, 3.0));

        let mut adaptive = sw(3.0, true);
        adaptive.bind(&loc, &loc).unwrap();
        assert_eq!(model.bounds(&adaptive, 4, Some(100.0), true).unwrap(), (4.0, 4.0));
    }

    #[test]
    fn test_builder_requires_weights() {
        assert!(MultiscaleGwrRegressor::builder().build().is_err());
    }
}
