//! Fit options and configuration.

use thiserror::Error;

/// How the per-location loop is scheduled.
///
/// The strategy is resolved once into an [`Executor`](crate::core::Executor)
/// when an estimator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelStrategy {
    /// Run every location on the calling thread (default).
    #[default]
    Serial,
    /// Split locations into contiguous chunks over a dedicated thread pool.
    ///
    /// `threads = 0` uses rayon's default thread count.
    Parallel { threads: usize },
}

/// Criterion minimized by the bandwidth selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BandwidthCriterion {
    /// Leave-one-out cross-validation sum of squared errors.
    #[default]
    Cv,
    /// Corrected Akaike Information Criterion.
    Aic,
}

/// Convergence measure of the multiscale backfitting loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackfittingCriterion {
    /// Absolute change of the residual sum of squares.
    Cvr,
    /// `sqrt(|RSS_new - RSS_old| / RSS_new)`.
    #[default]
    Dcvr,
}

/// Configuration options shared by the geographically weighted estimators.
#[derive(Debug, Clone)]
pub struct GwrOptions {
    /// Whether to prepend an intercept column (default: true).
    pub with_intercept: bool,
    /// Whether to track the hat matrix and compute inference (default: true).
    pub has_hat_matrix: bool,
    /// Scheduling of the per-location loop (default: serial).
    pub parallel: ParallelStrategy,
    /// The full hat matrix is only stored when n is below this (default: 8192).
    pub store_s_threshold: usize,
    /// Bracket and criterion tolerance of the golden-section search.
    pub golden_eps: f64,
    /// Iteration cap of the golden-section search.
    pub golden_max_iterations: usize,
}

impl Default for GwrOptions {
    fn default() -> Self {
        Self {
            with_intercept: true,
            has_hat_matrix: true,
            parallel: ParallelStrategy::Serial,
            store_s_threshold: 8192,
            golden_eps: 1e-4,
            golden_max_iterations: 100,
        }
    }
}

/// Errors that can occur when validating options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("store_s_threshold must be at least 1, got {0}")]
    InvalidStoreThreshold(usize),
    #[error("retry_times must be at least 1, got {0}")]
    InvalidRetryTimes(usize),
    #[error("adaptive lower bound must be at least 1, got {0}")]
    InvalidAdaptiveLower(usize),
    #[error("criterion threshold must be positive, got {0}")]
    InvalidCriterionThreshold(f64),
}

impl GwrOptions {
    /// Create a new builder for fit options.
    pub fn builder() -> GwrOptionsBuilder {
        GwrOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.golden_eps.is_nan() || self.golden_eps <= 0.0 {
            return Err(OptionsError::InvalidTolerance(self.golden_eps));
        }
        if self.golden_max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(
                self.golden_max_iterations,
            ));
        }
        if self.store_s_threshold < 1 {
            return Err(OptionsError::InvalidStoreThreshold(self.store_s_threshold));
        }
        Ok(())
    }
}

/// Builder for `GwrOptions`.
#[derive(Debug, Clone, Default)]
pub struct GwrOptionsBuilder {
    options: GwrOptions,
}

impl GwrOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether to include an intercept term.
    pub fn with_intercept(mut self, include: bool) -> Self {
        self.options.with_intercept = include;
        self
    }

    /// Set whether to track the hat matrix.
    pub fn hat_matrix(mut self, enabled: bool) -> Self {
        self.options.has_hat_matrix = enabled;
        self
    }

    /// Set the scheduling strategy of the per-location loop.
    pub fn parallel(mut self, strategy: ParallelStrategy) -> Self {
        self.options.parallel = strategy;
        self
    }

    /// Set the size below which the full hat matrix is stored.
    pub fn store_s_threshold(mut self, threshold: usize) -> Self {
        self.options.store_s_threshold = threshold;
        self
    }

    /// Set the golden-section tolerance.
    pub fn golden_eps(mut self, eps: f64) -> Self {
        self.options.golden_eps = eps;
        self
    }

    /// Set the golden-section iteration cap.
    pub fn golden_max_iterations(mut self, max_iter: usize) -> Self {
        self.options.golden_max_iterations = max_iter;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<GwrOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> GwrOptions {
        self.options
    }
}

/// Options of the multiscale backfitting loop.
#[derive(Debug, Clone)]
pub struct BackfittingOptions {
    /// Iteration cap (default: 500).
    pub max_iterations: usize,
    /// Convergence threshold on the backfitting criterion (default: 1e-6).
    pub criterion_threshold: f64,
    /// Convergence measure (default: dCVR).
    pub criterion: BackfittingCriterion,
    /// Consecutive stable iterations before a bandwidth freezes (default: 5).
    pub retry_times: usize,
    /// Lower bound of adaptive bandwidth searches (default: 10).
    pub adaptive_lower: usize,
}

impl Default for BackfittingOptions {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            criterion_threshold: 1e-6,
            criterion: BackfittingCriterion::Dcvr,
            retry_times: 5,
            adaptive_lower: 10,
        }
    }
}

impl BackfittingOptions {
    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        if self.criterion_threshold.is_nan() || self.criterion_threshold <= 0.0 {
            return Err(OptionsError::InvalidCriterionThreshold(
                self.criterion_threshold,
            ));
        }
        if self.retry_times < 1 {
            return Err(OptionsError::InvalidRetryTimes(self.retry_times));
        }
        if self.adaptive_lower < 1 {
            return Err(OptionsError::InvalidAdaptiveLower(self.adaptive_lower));
        }
        Ok(())
    }
}
