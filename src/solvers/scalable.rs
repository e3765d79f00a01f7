//! Scalable geographically weighted regression.
//!
//! The local kernel is approximated over the k nearest neighbours by a
//! polynomial in powers of a base Gaussian kernel `g0 = exp(-(d/band0)^2)`.
//! Per-location moment sums `sum x' G_q x` and `sum x' G_q y` are computed
//! once. Calibration then only re-mixes them with weights derived from a
//! scale `b` and adds a global ridge-like penalty `a X'X`, so a loss
//! evaluation never touches the neighbour lists again.

use super::gwr::check_inputs;
use super::traits::{FitStage, FittedSpatialRegressor, GwrError, SpatialRegressor};
use crate::core::{
    BandwidthCriterion, Executor, GwrOptions, GwrResult, OptionsError, ProgressSink, Reporter,
    Shat,
};
use crate::diagnostics::{aicc_from_rss, diagnostic_from_rss};
use crate::inference::{residual_variance, CoefficientInference};
use crate::selection::{NelderMead, SimplexResult};
use crate::spatial::{KernelFunction, Locations, SpatialWeight};
use crate::utils::{build_design_matrix, invert_cross_product, median, row_dot};
use faer::{Col, Mat};
use std::sync::Arc;

/// Starting point `(b~, a~)` of the calibration.
const START: [f64; 2] = [1.0, 0.01];
/// The base bandwidth is derived from the distance to this neighbour.
const BAND0_NEIGHBOUR: usize = 50;

/// Sorted neighbour lists, one per focus location.
#[derive(Debug, Clone)]
struct Neighbours {
    index: Vec<Vec<usize>>,
    distances: Vec<Vec<f64>>,
}

impl Neighbours {
    /// The `k` nearest reference points of every focus location.
    fn nearest(
        exec: &Executor,
        sw: &SpatialWeight,
        k: usize,
        exclude_self: bool,
    ) -> Result<Self, GwrError> {
        let lists = exec.map(sw.n_focus(), |i| {
            let d = sw.distance_vector(i)?;
            let mut order: Vec<usize> = (0..d.nrows())
                .filter(|&j| !(exclude_self && j == i))
                .collect();
            order.sort_by(|&a, &b| d[a].total_cmp(&d[b]));
            order.truncate(k);
            let distances = order.iter().map(|&j| d[j]).collect();
            Ok((order, distances))
        })?;
        let (index, distances) = lists.into_iter().unzip();
        Ok(Self { index, distances })
    }

    /// Prepend every focus point itself at distance 0, keeping `k` entries.
    fn with_focus(&self, k: usize) -> Self {
        let index = self
            .index
            .iter()
            .enumerate()
            .map(|(i, list)| std::iter::once(i).chain(list.iter().copied()).take(k).collect())
            .collect();
        let distances = self
            .distances
            .iter()
            .map(|list| std::iter::once(0.0).chain(list.iter().copied()).take(k).collect())
            .collect();
        Self { index, distances }
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Median distance to the `min(50, k)`-th neighbour, scaled for the kernel.
fn base_bandwidth(
    others: &Neighbours,
    k: usize,
    kernel: KernelFunction,
) -> Result<f64, GwrError> {
    let column = BAND0_NEIGHBOUR.min(k).saturating_sub(1);
    let values: Vec<f64> = others
        .distances
        .iter()
        .filter_map(|d| d.get(column).copied())
        .collect();
    let m = median(&values);
    let band0 = match kernel {
        KernelFunction::Gaussian => m / 3f64.sqrt(),
        KernelFunction::Exponential => m / 3.0,
        other => {
            return Err(GwrError::config(format!(
                "scalable gwr supports gaussian and exponential kernels, got {}",
                other.name()
            )))
        }
    };
    if band0.is_finite() && band0 > 0.0 {
        Ok(band0)
    } else {
        Err(GwrError::config(format!(
            "base bandwidth {band0} is not positive; too many coincident locations"
        )))
    }
}

/// Moment sums of one location.
///
/// `x[(k1 * (poly + 1) + q) * p + k2] = sum_j x_j,k1 G_jq x_j,k2` and
/// `y[q * p + k1] = sum_j x_j,k1 G_jq y_j`; `xx` repeats `x` with `G^2`.
#[derive(Debug, Clone)]
struct LocalMoments {
    x: Vec<f64>,
    xx: Vec<f64>,
    y: Vec<f64>,
}

/// Precomputed moments plus the global cross products.
#[derive(Debug, Clone)]
struct Moments {
    poly1: usize,
    p: usize,
    local: Vec<LocalMoments>,
    xtx: Mat<f64>,
    xty: Col<f64>,
}

impl Moments {
    fn compute(
        exec: &Executor,
        x: &Mat<f64>,
        y: &Col<f64>,
        neighbours: &Neighbours,
        band0: f64,
        polynomial: usize,
        with_squares: bool,
    ) -> Result<Self, GwrError> {
        let p = x.ncols();
        let poly1 = polynomial + 1;
        // Exponent of g0 in column q + 1: 2^(poly/2) / 2^(q+1).
        let exponents: Vec<f64> = (0..polynomial)
            .map(|q| 2f64.powf(polynomial as f64 / 2.0) / 2f64.powi(q as i32 + 1))
            .collect();

        let local = exec.map(neighbours.len(), |i| {
            let index = &neighbours.index[i];
            let mut m = LocalMoments {
                x: vec![0.0; poly1 * p * p],
                xx: if with_squares { vec![0.0; poly1 * p * p] } else { Vec::new() },
                y: vec![0.0; poly1 * p],
            };
            let mut g = vec![1.0; poly1];
            for (&j, &d) in index.iter().zip(&neighbours.distances[i]) {
                let g0 = (-(d / band0).powi(2)).exp();
                for (q, e) in exponents.iter().enumerate() {
                    g[q + 1] = g0.powf(*e);
                }
                for k1 in 0..p {
                    let xk1 = x[(j, k1)];
                    for (q, &gq) in g.iter().enumerate() {
                        let xg = xk1 * gq;
                        let base = (k1 * poly1 + q) * p;
                        for k2 in 0..p {
                            m.x[base + k2] += xg * x[(j, k2)];
                            if with_squares {
                                m.xx[base + k2] += xg * gq * x[(j, k2)];
                            }
                        }
                        m.y[q * p + k1] += xg * y[j];
                    }
                }
            }
            Ok(m)
        })?;

        let xtx = x.transpose() * x;
        let xty = x.transpose() * y;
        Ok(Self {
            poly1,
            p,
            local,
            xtx,
            xty,
        })
    }

    /// `sum_q r_q Mx_q + a X'X` and `sum_q r_q My_q + a X'y` at location `i`.
    fn system(&self, i: usize, r: &[f64], a: f64) -> (Mat<f64>, Col<f64>) {
        let (p, poly1) = (self.p, self.poly1);
        let m = &self.local[i];
        let sum_x = Mat::from_fn(p, p, |k1, k2| {
            let mixed: f64 = (0..poly1).map(|q| r[q] * m.x[(k1 * poly1 + q) * p + k2]).sum();
            mixed + a * self.xtx[(k1, k2)]
        });
        let sum_y = Col::from_fn(p, |k| {
            let mixed: f64 = (0..poly1).map(|q| r[q] * m.y[q * p + k]).sum();
            mixed + a * self.xty[k]
        });
        (sum_x, sum_y)
    }

    /// Second-moment matrix used by the variance terms.
    fn squares(&self, i: usize, r: &[f64], a: f64) -> Mat<f64> {
        let (p, poly1) = (self.p, self.poly1);
        let m = &self.local[i];
        Mat::from_fn(p, p, |k1, k2| {
            let mixed: f64 = (0..poly1)
                .map(|q| {
                    let idx = (k1 * poly1 + q) * p + k2;
                    2.0 * a * r[q] * m.x[idx] + r[q] * r[q] * m.xx[idx]
                })
                .sum();
            mixed + a * a * self.xtx[(k1, k2)]
        })
    }
}

/// Normalized mixing weights `(b, b^2, ..., b^(poly+1)) / sum`.
fn polynomial_weights(b: f64, poly1: usize) -> Option<Vec<f64>> {
    let mut r: Vec<f64> = (0..poly1)
        .map(|q| if q == 0 { b } else { b.powi(q as i32 + 1) })
        .collect();
    let total: f64 = r.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return None;
    }
    r.iter_mut().for_each(|v| *v /= total);
    Some(r)
}

/// `M' M` inverse and `M' s`, the least-squares pieces of a mixed system.
fn normal_solution(sum_x: &Mat<f64>, sum_y: &Col<f64>) -> Option<(Mat<f64>, Col<f64>)> {
    let mtm = sum_x.transpose() * sum_x;
    let inv = invert_cross_product(&mtm)?;
    let beta = &inv * (sum_x.transpose() * sum_y);
    Some((inv, beta))
}

/// Leave-one-out residual sum of squares for `(b~, a~)`.
fn cv_loss(
    exec: &Executor,
    moments: &Moments,
    x: &Mat<f64>,
    y: &Col<f64>,
    target: &[f64],
) -> Result<f64, GwrError> {
    let (b, a) = (target[0] * target[0], target[1] * target[1]);
    let Some(r) = polynomial_weights(b, moments.poly1) else {
        return Ok(f64::INFINITY);
    };
    let residuals = exec.map(x.nrows(), |i| {
        let (sum_x, sum_y) = moments.system(i, &r, a);
        Ok(invert_cross_product(&sum_x).map(|inv| {
            let beta = &inv * &sum_y;
            y[i] - row_dot(x, i, &beta)
        }))
    })?;
    let mut rss = 0.0;
    for res in residuals {
        match res {
            Some(e) => rss += e * e,
            None => return Ok(f64::INFINITY),
        }
    }
    Ok(if rss.is_finite() { rss } else { f64::INFINITY })
}

/// AICc for `(b~, a~)`.
fn aic_loss(
    exec: &Executor,
    moments: &Moments,
    x: &Mat<f64>,
    y: &Col<f64>,
    target: &[f64],
) -> Result<f64, GwrError> {
    let (b, a) = (target[0] * target[0], target[1] * target[1]);
    let Some(r) = polynomial_weights(b, moments.poly1) else {
        return Ok(f64::INFINITY);
    };
    let n = x.nrows();
    let p = x.ncols();
    let terms = exec.map(n, |i| {
        let (sum_x, sum_y) = moments.system(i, &r, a);
        Ok(normal_solution(&sum_x, &sum_y).map(|(inv, beta)| {
            let s_ii: f64 = (0..p)
                .map(|j| x[(i, j)] * (0..p).map(|k| inv[(j, k)] * x[(i, k)]).sum::<f64>())
                .sum();
            (y[i] - row_dot(x, i, &beta), s_ii)
        }))
    })?;
    let mut rss = 0.0;
    let mut trace_s = 0.0;
    for term in terms {
        let Some((e, s_ii)) = term else {
            return Ok(f64::INFINITY);
        };
        rss += e * e;
        trace_s += s_ii;
    }
    let value = aicc_from_rss(rss, n, trace_s);
    Ok(if value.is_finite() { value } else { f64::INFINITY })
}

/// Per-location output of the final fit.
struct FinalRow {
    beta: Col<f64>,
    variance_factors: Col<f64>,
    trace_s: f64,
    trace_sts: f64,
}

fn final_row(
    moments: &Moments,
    x: &Mat<f64>,
    i: usize,
    r: &[f64],
    a: f64,
) -> Result<FinalRow, GwrError> {
    let p = x.ncols();
    let (sum_x, sum_y) = moments.system(i, r, a);
    let (inv, beta) = normal_solution(&sum_x, &sum_y).ok_or(GwrError::SingularSystem {
        stage: FitStage::LocalSolve,
        location: i,
    })?;
    let sum_x2 = moments.squares(i, r, a);

    let v = Col::from_fn(p, |j| (0..p).map(|k| inv[(j, k)] * x[(i, k)]).sum::<f64>());
    let trace_s = (0..p).map(|j| x[(i, j)] * v[j]).sum();
    let w = &sum_x2 * &v;
    let trace_sts = (0..p).map(|j| v[j] * w[j]).sum();
    let cov = &inv * &sum_x2 * &inv;
    let variance_factors = Col::from_fn(p, |j| cov[(j, j)]);

    if beta.iter().any(|b| !b.is_finite()) {
        return Err(GwrError::NonFiniteResult {
            stage: FitStage::LocalSolve,
            location: Some(i),
        });
    }
    Ok(FinalRow {
        beta,
        variance_factors,
        trace_s,
        trace_sts,
    })
}

/// Scalable GWR estimator.
///
/// The bandwidth of the spatial weight is the neighbour count `k`; its
/// kernel must be Gaussian or exponential.
#[derive(Debug, Clone)]
pub struct ScalableGwrRegressor {
    options: GwrOptions,
    spatial_weight: SpatialWeight,
    polynomial: usize,
    criterion: BandwidthCriterion,
    max_iterations: usize,
    executor: Executor,
    reporter: Reporter,
}

impl ScalableGwrRegressor {
    pub fn builder() -> ScalableGwrRegressorBuilder {
        ScalableGwrRegressorBuilder::default()
    }

    pub fn options(&self) -> &GwrOptions {
        &self.options
    }

    pub fn polynomial(&self) -> usize {
        self.polynomial
    }

    pub fn criterion(&self) -> BandwidthCriterion {
        self.criterion
    }

    fn calibrate(
        &self,
        moments: &Moments,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<SimplexResult, GwrError> {
        let simplex = NelderMead::new(0.01, 1e-6, self.max_iterations);
        let exec = &self.executor;
        let result = simplex
            .minimize(&START, |target| {
                let value = match self.criterion {
                    BandwidthCriterion::Cv => cv_loss(exec, moments, x, y, target)?,
                    BandwidthCriterion::Aic => aic_loss(exec, moments, x, y, target)?,
                };
                self.reporter.debug(
                    "scale calibration",
                    &format!(
                        "scale {}, penalty {}: {value}",
                        target[0].powi(2),
                        target[1].powi(2)
                    ),
                );
                Ok(value)
            })
            .map_err(|e| e.at_stage(FitStage::ScaleCalibration))?;
        if !result.converged {
            self.reporter.warn(
                "scale calibration",
                &format!(
                    "simplex stopped after {} iterations without converging",
                    result.iterations
                ),
            );
        }
        Ok(result)
    }
}

impl SpatialRegressor for ScalableGwrRegressor {
    type Fitted = FittedScalableGwr;

    fn fit(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Self::Fitted, GwrError> {
        check_inputs(locations, x, y, self.options.with_intercept)?;
        let design = build_design_matrix(x, self.options.with_intercept);
        let n = design.nrows();
        let p = design.ncols();
        if n <= p {
            return Err(GwrError::InsufficientObservations {
                needed: p + 1,
                got: n,
            });
        }

        let mut sw = self.spatial_weight.clone();
        let weight = *sw.bandwidth()?;
        let k = (weight.bandwidth as usize).min(n - 1);
        if k < 1 {
            return Err(GwrError::config(format!(
                "scalable gwr needs at least one neighbour, got bandwidth {}",
                weight.bandwidth
            )));
        }
        sw.set_bandwidth(k as f64)?;
        sw.bind(locations, locations)?;

        let exec = &self.executor;
        let others = Neighbours::nearest(exec, &sw, k, true)?;
        let band0 = base_bandwidth(&others, k, weight.kernel)?;
        let calibration_neighbours = match self.criterion {
            BandwidthCriterion::Cv => others.clone(),
            BandwidthCriterion::Aic => others.with_focus(k + 1),
        };
        let moments = Moments::compute(
            exec,
            &design,
            y,
            &calibration_neighbours,
            band0,
            self.polynomial,
            false,
        )?;

        let calibration = self.calibrate(&moments, &design, y)?;
        let scale = calibration.point[0].powi(2);
        let penalty = calibration.point[1].powi(2);
        self.reporter.info(
            "scalable gwr",
            &format!(
                "calibrated scale {scale}, penalty {penalty} ({:?} {})",
                self.criterion, calibration.value
            ),
        );

        let fit_neighbours = others.with_focus(k);
        let moments = Moments::compute(
            exec,
            &design,
            y,
            &fit_neighbours,
            band0,
            self.polynomial,
            true,
        )?;
        let r = polynomial_weights(scale, moments.poly1).ok_or_else(|| {
            GwrError::OptimizationFailed {
                stage: FitStage::ScaleCalibration,
                reason: format!("scale {scale} gives no valid kernel weights"),
            }
        })?;
        let rows = exec.map(n, |i| final_row(&moments, &design, i, &r, penalty))?;

        let betas = Mat::from_fn(n, p, |i, j| rows[i].beta[j]);
        let mut result = GwrResult::from_betas(betas, &design, y, self.options.with_intercept);
        if self.options.has_hat_matrix {
            let shat = Shat::new(
                rows.iter().map(|row| row.trace_s).sum(),
                rows.iter().map(|row| row.trace_sts).sum(),
            );
            let diagnostic = diagnostic_from_rss(y, result.rss(), &shat);
            let sigma2 = residual_variance(diagnostic.rss, diagnostic.edf);
            let variance_factors = Mat::from_fn(n, p, |i, j| rows[i].variance_factors[j]);
            let std_errors = CoefficientInference::standard_errors(&variance_factors, sigma2);
            let t_values = CoefficientInference::t_statistics(&result.betas, &std_errors);
            result.p_values = Some(CoefficientInference::p_values(&t_values, diagnostic.edf));
            result.t_values = Some(t_values);
            result.std_errors = Some(std_errors);
            result.diagnostic = Some(diagnostic);
            result.shat = Some(shat);
        }

        Ok(FittedScalableGwr {
            result,
            locations: locations.clone(),
            x: design,
            y: y.to_owned(),
            spatial_weight: sw,
            neighbours: k,
            polynomial: self.polynomial,
            band0,
            scale,
            penalty,
            calibration,
            executor: self.executor.clone(),
        })
    }
}

/// A fitted scalable GWR model.
#[derive(Debug, Clone)]
pub struct FittedScalableGwr {
    result: GwrResult,
    locations: Locations,
    x: Mat<f64>,
    y: Col<f64>,
    spatial_weight: SpatialWeight,
    neighbours: usize,
    polynomial: usize,
    band0: f64,
    scale: f64,
    penalty: f64,
    calibration: SimplexResult,
    executor: Executor,
}

impl FittedScalableGwr {
    pub fn spatial_weight(&self) -> &SpatialWeight {
        &self.spatial_weight
    }

    /// Neighbour count used by every local model.
    pub fn neighbours(&self) -> usize {
        self.neighbours
    }

    /// Calibrated kernel scale `b`.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Calibrated global penalty `a`.
    pub fn penalty(&self) -> f64 {
        self.penalty
    }

    /// Bandwidth of the base Gaussian kernel.
    pub fn base_bandwidth(&self) -> f64 {
        self.band0
    }

    /// Minimized calibration loss (CV or AICc).
    pub fn loss(&self) -> f64 {
        self.calibration.value
    }

    pub fn calibration(&self) -> &SimplexResult {
        &self.calibration
    }
}

impl FittedSpatialRegressor for FittedScalableGwr {
    fn result(&self) -> &GwrResult {
        &self.result
    }

    fn predict(&self, locations: &Locations) -> Result<Mat<f64>, GwrError> {
        let rebound = self.spatial_weight.rebind_focus(locations, &self.locations)?;
        let neighbours = Neighbours::nearest(&self.executor, &rebound, self.neighbours, false)?;
        let moments = Moments::compute(
            &self.executor,
            &self.x,
            &self.y,
            &neighbours,
            self.band0,
            self.polynomial,
            false,
        )?;
        let r = polynomial_weights(self.scale, moments.poly1).ok_or_else(|| {
            GwrError::config(format!("scale {} gives no valid kernel weights", self.scale))
        })?;

        let p = self.x.ncols();
        let rows = self.executor.map(locations.len(), |i| {
            let (sum_x, sum_y) = moments.system(i, &r, self.penalty);
            let (_, beta) = normal_solution(&sum_x, &sum_y).ok_or(GwrError::SingularSystem {
                stage: FitStage::Prediction,
                location: i,
            })?;
            Ok(beta)
        })?;
        Ok(Mat::from_fn(rows.len(), p, |i, j| rows[i][j]))
    }
}

/// Builder for `ScalableGwrRegressor`.
pub struct ScalableGwrRegressorBuilder {
    options: GwrOptions,
    spatial_weight: Option<SpatialWeight>,
    polynomial: usize,
    criterion: BandwidthCriterion,
    max_iterations: usize,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl Default for ScalableGwrRegressorBuilder {
    fn default() -> Self {
        Self {
            options: GwrOptions::default(),
            spatial_weight: None,
            polynomial: 4,
            criterion: BandwidthCriterion::Cv,
            max_iterations: 500,
            sink: None,
        }
    }
}

impl ScalableGwrRegressorBuilder {
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

    /// Spatial weight whose bandwidth is the neighbour count.
    pub fn spatial_weight(mut self, spatial_weight: SpatialWeight) -> Self {
        self.spatial_weight = Some(spatial_weight);
        self
    }

    /// Polynomial order of the kernel approximation (default: 4).
    pub fn polynomial(mut self, polynomial: usize) -> Self {
        self.polynomial = polynomial;
        self
    }

    /// Calibration loss (default: CV).
    pub fn criterion(mut self, criterion: BandwidthCriterion) -> Self {
        self.criterion = criterion;
        self
    }

    /// Iteration cap of the simplex (default: 500).
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<ScalableGwrRegressor, GwrError> {
        self.options.validate()?;
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations).into());
        }
        if self.polynomial < 1 {
            return Err(GwrError::config("polynomial order must be at least 1"));
        }
        let spatial_weight = self
            .spatial_weight
            .ok_or_else(|| GwrError::config("no spatial weight given"))?;
        if spatial_weight.distance().is_none() {
            return Err(GwrError::config("spatial weight has no distance assigned"));
        }
        let weight = spatial_weight.bandwidth()?;
        if !matches!(
            weight.kernel,
            KernelFunction::Gaussian | KernelFunction::Exponential
        ) {
            return Err(GwrError::config(format!(
                "scalable gwr supports gaussian and exponential kernels, got {}",
                weight.kernel.name()
            )));
        }
        if weight.bandwidth.is_nan() || weight.bandwidth < 1.0 {
            return Err(GwrError::config(format!(
                "neighbour count must be at least 1, got {}",
                weight.bandwidth
            )));
        }

        let executor = Executor::new(self.options.parallel)?;
        Ok(ScalableGwrRegressor {
            options: self.options,
            spatial_weight,
            polynomial: self.polynomial,
            criterion: self.criterion,
            max_iterations: self.max_iterations,
            executor,
            reporter: Reporter::new(self.sink),
        })
    }
}
