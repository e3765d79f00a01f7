//! Basic geographically weighted regression.

use super::local::{fit_coefficients, fit_with_hat, local_weights, solve, HatFit};
use super::traits::{FitStage, FittedSpatialRegressor, GwrError, SpatialRegressor};
use crate::core::{
    BandwidthCriterion, Executor, GwrOptions, GwrResult, ProgressSink, Reporter,
};
use crate::diagnostics::{calc_diagnostic, local_r_squared, studentized_residuals};
use crate::inference::{residual_variance, CoefficientInference};
use crate::selection::{
    criterion, variables_criterion, GoldenSectionSelector, VariableCriterion,
    VariableForwardSelector,
};
use crate::spatial::{Locations, SpatialWeight};
use crate::utils::{build_design_matrix, detect_constant_columns};
use faer::{Col, Mat};
use std::sync::Arc;

/// Geographically weighted regression estimator.
///
/// At every observation location a weighted least squares model is fitted,
/// the weights decaying with distance from that location. The bandwidth of
/// the kernel can be given or calibrated by golden-section search on CV or
/// AICc. Independent variables can optionally be chosen by forward
/// selection first.
///
/// With a space-time distance and timestamped locations the same estimator
/// fits a geographically and temporally weighted regression (GTWR).
///
/// # Example
///
/// ```rust,ignore
/// use gwr_rs::prelude::*;
///
/// let fitted = GwrRegressor::builder()
///     .spatial_weight(SpatialWeight::new(
///         Distance::euclidean(),
///         BandwidthWeight::adaptive(36, KernelFunction::Gaussian),
///     ))
///     .build()?
///     .fit(&locations, &x, &y)?;
///
/// println!("AICc = {}", fitted.diagnostic().unwrap().aicc);
/// ```
#[derive(Debug, Clone)]
pub struct GwrRegressor {
    options: GwrOptions,
    spatial_weight: SpatialWeight,
    bandwidth_selection: Option<BandwidthCriterion>,
    variable_selection: Option<f64>,
    executor: Executor,
    reporter: Reporter,
}

impl GwrRegressor {
    /// Create a new builder.
    pub fn builder() -> GwrRegressorBuilder {
        GwrRegressorBuilder::default()
    }

    pub fn options(&self) -> &GwrOptions {
        &self.options
    }

    pub fn spatial_weight(&self) -> &SpatialWeight {
        &self.spatial_weight
    }

    pub(crate) fn executor(&self) -> &Executor {
        &self.executor
    }

    pub(crate) fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Variable selection and bandwidth calibration.
    pub(crate) fn calibrate(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Calibration, GwrError> {
        check_inputs(locations, x, y, self.options.with_intercept)?;
        let n = x.nrows();

        let mut sw = self.spatial_weight.clone();
        if self.bandwidth_selection.is_some() {
            // The starting value is irrelevant, keep it within range.
            let weight = *sw.bandwidth()?;
            if weight.adaptive && weight.bandwidth > n as f64 {
                sw.set_bandwidth(n as f64)?;
            }
        }
        sw.bind(locations, locations)?;

        let candidates: Vec<usize> = (0..x.ncols()).collect();
        let mut selected_variables = candidates.clone();
        let mut variable_criteria = Vec::new();
        if let Some(threshold) = self.variable_selection {
            let mut selector = VariableForwardSelector::new(threshold);
            let chosen = selector.optimize(&candidates, |vars| {
                variables_criterion(x, y, vars, self.options.with_intercept)
            })?;
            if !chosen.is_empty() {
                selected_variables = chosen;
            }
            variable_criteria = selector.criterion_list().to_vec();
            self.reporter.info(
                "variable selection",
                &format!("selected variables {selected_variables:?}"),
            );
        }

        let sub = Mat::from_fn(n, selected_variables.len(), |i, j| {
            x[(i, selected_variables[j])]
        });
        let design = build_design_matrix(&sub, self.options.with_intercept);
        if n <= design.ncols() {
            return Err(GwrError::InsufficientObservations {
                needed: design.ncols() + 1,
                got: n,
            });
        }

        let mut bandwidth_criteria = Vec::new();
        if let Some(crit) = self.bandwidth_selection {
            let (lower, upper) = bandwidth_bounds(&sw, n, design.ncols())?;
            let (bandwidth, list) = select_bandwidth(
                &self.executor,
                &self.reporter,
                &self.options,
                crit,
                &design,
                y,
                &sw,
                None,
                lower,
                upper,
            )?;
            sw.set_bandwidth(bandwidth)?;
            bandwidth_criteria = list;
        }

        Ok(Calibration {
            x: design,
            spatial_weight: sw,
            bandwidth_criteria,
            variable_criteria,
            selected_variables,
        })
    }
}

impl SpatialRegressor for GwrRegressor {
    type Fitted = FittedGwr;

    fn fit(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Self::Fitted, GwrError> {
        let calibration = self.calibrate(locations, x, y)?;
        let result = fit_final(
            &self.executor,
            &self.options,
            &calibration.x,
            y,
            &calibration.spatial_weight,
            None,
        )?;
        if let Some(diag) = &result.diagnostic {
            self.reporter
                .info("gwr", &format!("AICc {:.4}, R² {:.4}", diag.aicc, diag.r_squared));
        }

        Ok(FittedGwr {
            result,
            locations: locations.clone(),
            x: calibration.x,
            y: y.to_owned(),
            spatial_weight: calibration.spatial_weight,
            bandwidth_criteria: calibration.bandwidth_criteria,
            variable_criteria: calibration.variable_criteria,
            selected_variables: calibration.selected_variables,
            executor: self.executor.clone(),
        })
    }
}

/// Calibrated inputs of a final fit.
#[derive(Debug, Clone)]
pub(crate) struct Calibration {
    /// Design matrix, intercept included.
    pub x: Mat<f64>,
    pub spatial_weight: SpatialWeight,
    pub bandwidth_criteria: Vec<(f64, f64)>,
    pub variable_criteria: Vec<VariableCriterion>,
    pub selected_variables: Vec<usize>,
}

/// Validate shapes of locations, predictors and response.
pub(crate) fn check_inputs(
    locations: &Locations,
    x: &Mat<f64>,
    y: &Col<f64>,
    with_intercept: bool,
) -> Result<(), GwrError> {
    if x.nrows() != y.nrows() {
        return Err(GwrError::DimensionMismatch {
            x_rows: x.nrows(),
            y_len: y.nrows(),
        });
    }
    if locations.len() != x.nrows() {
        return Err(GwrError::LocationMismatch {
            expected: x.nrows(),
            got: locations.len(),
        });
    }
    if x.ncols() == 0 && !with_intercept {
        return Err(GwrError::config("no predictors and no intercept"));
    }
    if with_intercept {
        if let Some(j) = detect_constant_columns(x, 1e-12).iter().position(|&c| c) {
            return Err(GwrError::config(format!(
                "predictor column {j} is constant and collinear with the intercept"
            )));
        }
    }
    Ok(())
}

/// Search interval of a bandwidth: adaptive `[20, n]`, fixed `(0, max distance]`.
pub(crate) fn bandwidth_bounds(
    sw: &SpatialWeight,
    n: usize,
    n_parameters: usize,
) -> Result<(f64, f64), GwrError> {
    let weight = sw.bandwidth()?;
    if weight.adaptive {
        let lower = if n >= 20 { 20 } else { (n_parameters + 1).min(n) };
        Ok((lower as f64, n as f64))
    } else {
        Ok((0.0, sw.max_distance()?))
    }
}

/// Golden-section bandwidth search on `criterion`.
///
/// Returns the selected bandwidth and the evaluated `(bandwidth, criterion)`
/// pairs sorted by bandwidth.
#[allow(clippy::too_many_arguments)]
pub(crate) fn select_bandwidth(
    exec: &Executor,
    reporter: &Reporter,
    options: &GwrOptions,
    crit: BandwidthCriterion,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    observation_weights: Option<&Col<f64>>,
    lower: f64,
    upper: f64,
) -> Result<(f64, Vec<(f64, f64)>), GwrError> {
    let base = *sw.bandwidth()?;
    let mut selector = GoldenSectionSelector::new(lower, upper)
        .with_eps(options.golden_eps)
        .with_max_iterations(options.golden_max_iterations);
    let mut evaluations = 0;
    let bandwidth = selector.optimize(base.adaptive, |bw| {
        let value = criterion::evaluate(
            crit,
            exec,
            x,
            y,
            sw,
            &base.with_bandwidth(bw),
            observation_weights,
        )?;
        evaluations += 1;
        reporter.debug(
            "bandwidth search",
            &format!("bandwidth {bw}: {crit:?} {value}"),
        );
        Ok(value)
    })?;
    reporter.info(
        "bandwidth search",
        &format!("selected bandwidth {bandwidth} after {evaluations} evaluations"),
    );
    Ok((bandwidth, selector.criterion_list()))
}

/// The final fit at a calibrated bandwidth.
///
/// Numerical failures are hard errors here. With hat-matrix tracking the
/// result carries standard errors, t-values, p-values, studentized
/// residuals, local R², the diagnostic and, below the storage threshold,
/// the full hat matrix.
pub(crate) fn fit_final(
    exec: &Executor,
    options: &GwrOptions,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    observation_weights: Option<&Col<f64>>,
) -> Result<GwrResult, GwrError> {
    let n = x.nrows();
    if !options.has_hat_matrix {
        let betas = fit_coefficients(exec, x, y, sw, observation_weights)?;
        return Ok(GwrResult::from_betas(betas, x, y, options.with_intercept));
    }

    let store_s = n < options.store_s_threshold;
    let hat = fit_with_hat(exec, x, y, sw, observation_weights, store_s)?;
    result_with_inference(exec, x, y, sw, hat, options.with_intercept)
}

/// Assemble a full result from a fit with hat-matrix tracking.
pub(crate) fn result_with_inference(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    hat: HatFit,
    has_intercept: bool,
) -> Result<GwrResult, GwrError> {
    let HatFit {
        betas,
        variance_factors,
        shat,
        q_diag,
        hat_matrix,
    } = hat;

    let diagnostic = calc_diagnostic(x, y, &betas, &shat);
    let sigma2 = residual_variance(diagnostic.rss, diagnostic.edf);
    let std_errors = CoefficientInference::standard_errors(&variance_factors, sigma2);
    let t_values = CoefficientInference::t_statistics(&betas, &std_errors);
    let p_values = CoefficientInference::p_values(&t_values, diagnostic.edf);

    let mut result = GwrResult::from_betas(betas, x, y, has_intercept);
    result.studentized_residuals = Some(studentized_residuals(&result.residuals, &q_diag, sigma2));
    result.local_r_squared = Some(local_r_squared(exec, sw, y, &result.fitted_values)?);
    result.shat = Some(shat);
    result.hat_matrix = hat_matrix;
    result.diagnostic = Some(diagnostic);
    result.std_errors = Some(std_errors);
    result.t_values = Some(t_values);
    result.p_values = Some(p_values);
    Ok(result)
}

/// Local coefficients at new focus locations against the training data.
pub(crate) fn predict_coefficients(
    exec: &Executor,
    sw: &SpatialWeight,
    training: &Locations,
    targets: &Locations,
    x: &Mat<f64>,
    y: &Col<f64>,
    observation_weights: Option<&Col<f64>>,
) -> Result<Mat<f64>, GwrError> {
    let rebound = sw.rebind_focus(targets, training)?;
    let rows = exec.map(rebound.n_focus(), |i| {
        let w = local_weights(&rebound, i, observation_weights)?;
        solve(x, y, &w, i).map_err(|e| e.at_stage(FitStage::Prediction))
    })?;
    Ok(Mat::from_fn(rows.len(), x.ncols(), |i, j| rows[i][j]))
}

/// A fitted GWR model.
#[derive(Debug, Clone)]
pub struct FittedGwr {
    result: GwrResult,
    locations: Locations,
    x: Mat<f64>,
    y: Col<f64>,
    spatial_weight: SpatialWeight,
    bandwidth_criteria: Vec<(f64, f64)>,
    variable_criteria: Vec<VariableCriterion>,
    selected_variables: Vec<usize>,
    executor: Executor,
}

impl FittedGwr {
    /// The spatial weight with the calibrated bandwidth.
    pub fn spatial_weight(&self) -> &SpatialWeight {
        &self.spatial_weight
    }

    /// The bandwidth the model was fitted with.
    pub fn bandwidth(&self) -> f64 {
        self.spatial_weight
            .weight()
            .map_or(f64::NAN, |w| w.bandwidth)
    }

    /// Evaluated `(bandwidth, criterion)` pairs of the last bandwidth search.
    pub fn bandwidth_criterion_list(&self) -> &[(f64, f64)] {
        &self.bandwidth_criteria
    }

    /// Evaluated `(variables, AICc)` pairs of forward selection.
    pub fn variable_criterion_list(&self) -> &[VariableCriterion] {
        &self.variable_criteria
    }

    /// Predictor columns used in the model, in selection order.
    pub fn selected_variables(&self) -> &[usize] {
        &self.selected_variables
    }

    /// The design matrix, intercept included.
    pub fn design_matrix(&self) -> &Mat<f64> {
        &self.x
    }
}

impl FittedSpatialRegressor for FittedGwr {
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
            None,
        )
    }
}

/// Builder for `GwrRegressor`.
#[derive(Default)]
pub struct GwrRegressorBuilder {
    options: GwrOptions,
    spatial_weight: SpatialWeight,
    bandwidth_selection: Option<BandwidthCriterion>,
    variable_selection: Option<f64>,
    sink: Option<Arc<dyn ProgressSink>>,
}

impl GwrRegressorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all shared options.
    pub fn options(mut self, options: GwrOptions) -> Self {
        self.options = options;
        self
    }

    /// Set whether to include an intercept term.
    pub fn with_intercept(mut self, include: bool) -> Self {
        self.options.with_intercept = include;
        self
    }

    /// Set whether to track the hat matrix and compute inference.
    pub fn hat_matrix(mut self, enabled: bool) -> Self {
        self.options.has_hat_matrix = enabled;
        self
    }

    /// Set the distance and kernel.
    pub fn spatial_weight(mut self, spatial_weight: SpatialWeight) -> Self {
        self.spatial_weight = spatial_weight;
        self
    }

    /// Calibrate the bandwidth on `criterion` before fitting.
    pub fn autoselect_bandwidth(mut self, criterion: BandwidthCriterion) -> Self {
        self.bandwidth_selection = Some(criterion);
        self
    }

    /// Run forward variable selection with the given AICc threshold.
    pub fn autoselect_variables(mut self, threshold: f64) -> Self {
        self.variable_selection = Some(threshold);
        self
    }

    /// Attach a progress sink.
    pub fn progress_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the options and resolve the parallel strategy.
    pub fn build(self) -> Result<GwrRegressor, GwrError> {
        self.options.validate()?;
        if self.spatial_weight.distance().is_none() {
            return Err(GwrError::config("spatial weight has no distance assigned"));
        }
        self.spatial_weight.bandwidth()?;
        let executor = Executor::new(self.options.parallel)?;
        Ok(GwrRegressor {
            options: self.options,
            spatial_weight: self.spatial_weight,
            bandwidth_selection: self.bandwidth_selection,
            variable_selection: self.variable_selection,
            executor,
            reporter: Reporter::new(self.sink),
        })
    }
}
