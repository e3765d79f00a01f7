//! Fit result structures.

use faer::{Col, Mat};

/// Hat-matrix traces accumulated over all locations.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Shat {
    /// `trace(S)`.
    pub trace_s: f64,
    /// `trace(S'S)`.
    pub trace_sts: f64,
}

impl Shat {
    pub fn new(trace_s: f64, trace_sts: f64) -> Self {
        Self { trace_s, trace_sts }
    }

    /// Effective number of parameters, `2 tr(S) - tr(S'S)`.
    pub fn enp(&self) -> f64 {
        2.0 * self.trace_s - self.trace_sts
    }

    /// Effective residual degrees of freedom, `n - 2 tr(S) + tr(S'S)`.
    pub fn edf(&self, n: usize) -> f64 {
        n as f64 - self.enp()
    }
}

/// Goodness-of-fit record of a completed fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressionDiagnostic {
    /// Residual sum of squares.
    pub rss: f64,
    /// Akaike Information Criterion.
    pub aic: f64,
    /// Corrected AIC.
    pub aicc: f64,
    /// Effective number of parameters.
    pub enp: f64,
    /// Effective degrees of freedom.
    pub edf: f64,
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Adjusted R², using the effective degrees of freedom.
    pub adj_r_squared: f64,
}

/// Complete result from a geographically weighted fit.
#[derive(Debug, Clone)]
pub struct GwrResult {
    // ========== Core Results ==========
    /// Local coefficients, one row per location (n x p).
    pub betas: Mat<f64>,

    /// Fitted values `sum_j x_ij * beta_ij`.
    pub fitted_values: Col<f64>,

    /// Residuals (y - fitted_values).
    pub residuals: Col<f64>,

    /// Number of observations.
    pub n_observations: usize,

    /// Number of local coefficients, including the intercept.
    pub n_parameters: usize,

    /// Whether column 0 of the design is an intercept.
    pub has_intercept: bool,

    // ========== Hat Matrix ==========
    /// Hat-matrix traces (absent when hat-matrix tracking is disabled).
    pub shat: Option<Shat>,

    /// The full hat matrix S, stored only below the size threshold.
    pub hat_matrix: Option<Mat<f64>>,

    /// Goodness-of-fit diagnostic.
    pub diagnostic: Option<RegressionDiagnostic>,

    // ========== Local Inference ==========
    /// Standard errors of the local coefficients.
    pub std_errors: Option<Mat<f64>>,

    /// Local t-values, `beta / se`.
    pub t_values: Option<Mat<f64>>,

    /// Two-sided p-values of the local t-values.
    pub p_values: Option<Mat<f64>>,

    /// Studentized residuals.
    pub studentized_residuals: Option<Col<f64>>,

    /// Local R² at every location.
    pub local_r_squared: Option<Col<f64>>,
}

impl GwrResult {
    /// A result carrying only coefficients, fitted values and residuals.
    pub(crate) fn from_betas(betas: Mat<f64>, x: &Mat<f64>, y: &Col<f64>, has_intercept: bool) -> Self {
        let fitted_values = crate::utils::fitted_values(x, &betas);
        let residuals = Col::from_fn(y.nrows(), |i| y[i] - fitted_values[i]);
        Self {
            n_observations: betas.nrows(),
            n_parameters: betas.ncols(),
            betas,
            fitted_values,
            residuals,
            has_intercept,
            shat: None,
            hat_matrix: None,
            diagnostic: None,
            std_errors: None,
            t_values: None,
            p_values: None,
            studentized_residuals: None,
            local_r_squared: None,
        }
    }

    /// Residual sum of squares.
    pub fn rss(&self) -> f64 {
        self.residuals.iter().map(|r| r * r).sum()
    }

    /// Coefficients at location `i`.
    pub fn betas_at(&self, i: usize) -> Col<f64> {
        Col::from_fn(self.n_parameters, |j| self.betas[(i, j)])
    }
}
