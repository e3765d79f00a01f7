//! Core traits and the error type for geographically weighted estimators.

use crate::core::{GwrResult, OptionsError, RegressionDiagnostic};
use crate::spatial::Locations;
use faer::{Col, Mat};
use std::fmt;
use thiserror::Error;

/// The stage of a fit in which an error was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStage {
    /// Binding distances, kernels and locations.
    DistanceSetup,
    /// Solving the weighted normal equations at one location.
    LocalSolve,
    /// Calibrating a bandwidth with the golden-section selector.
    BandwidthSearch,
    /// The multiscale backfitting loop.
    Backfitting,
    /// Local solves at out-of-sample locations.
    Prediction,
    /// Simplex calibration of the scalable model parameters.
    ScaleCalibration,
}

impl fmt::Display for FitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FitStage::DistanceSetup => "distance setup",
            FitStage::LocalSolve => "local solve",
            FitStage::BandwidthSearch => "bandwidth search",
            FitStage::Backfitting => "backfitting",
            FitStage::Prediction => "prediction",
            FitStage::ScaleCalibration => "scale calibration",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while fitting a geographically weighted model.
#[derive(Debug, Error)]
pub enum GwrError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("dimension mismatch: X has {x_rows} rows but y has {y_len} elements")]
    DimensionMismatch { x_rows: usize, y_len: usize },

    #[error("location mismatch: expected {expected} locations, got {got}")]
    LocationMismatch { expected: usize, got: usize },

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("weighted cross-product matrix is singular at location {location} during {stage}")]
    SingularSystem { stage: FitStage, location: usize },

    #[error("optimization failed during {stage}: {reason}")]
    OptimizationFailed { stage: FitStage, reason: String },

    #[error("non-finite result during {stage}")]
    NonFiniteResult {
        stage: FitStage,
        location: Option<usize>,
    },

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
}

impl GwrError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        GwrError::InvalidConfiguration(message.into())
    }

    /// The stage this error is attributed to.
    pub fn stage(&self) -> FitStage {
        match self {
            GwrError::SingularSystem { stage, .. }
            | GwrError::OptimizationFailed { stage, .. }
            | GwrError::NonFiniteResult { stage, .. } => *stage,
            _ => FitStage::DistanceSetup,
        }
    }

    /// Whether the error is a recoverable numerical failure.
    ///
    /// Criterion evaluations map these to `+inf` instead of aborting a search.
    pub fn is_numerical(&self) -> bool {
        matches!(
            self,
            GwrError::SingularSystem { .. } | GwrError::NonFiniteResult { .. }
        )
    }

    /// Re-attribute a numerical failure to another stage.
    pub(crate) fn at_stage(self, stage: FitStage) -> Self {
        match self {
            GwrError::SingularSystem { location, .. } => {
                GwrError::SingularSystem { stage, location }
            }
            GwrError::NonFiniteResult { location, .. } => {
                GwrError::NonFiniteResult { stage, location }
            }
            other => other,
        }
    }
}

/// A geographically weighted estimator that can be fit to located data.
pub trait SpatialRegressor {
    /// The type of the fitted model.
    type Fitted: FittedSpatialRegressor;

    /// Fit the model.
    ///
    /// # Arguments
    /// * `locations` - Coordinates (and optional timestamps) of the n observations
    /// * `x` - Predictors of shape (n, k), without an intercept column
    /// * `y` - Response of length n
    fn fit(
        &self,
        locations: &Locations,
        x: &Mat<f64>,
        y: &Col<f64>,
    ) -> Result<Self::Fitted, GwrError>;
}

/// A fitted geographically weighted model.
pub trait FittedSpatialRegressor {
    /// Access the fit results.
    fn result(&self) -> &GwrResult;

    /// Local coefficients at out-of-sample locations, one row per location.
    fn predict(&self, locations: &Locations) -> Result<Mat<f64>, GwrError>;

    /// Local coefficient matrix (n x p).
    fn betas(&self) -> &Mat<f64> {
        &self.result().betas
    }

    /// Fitted values on the training data.
    fn fitted_values(&self) -> &Col<f64> {
        &self.result().fitted_values
    }

    /// Residuals on the training data.
    fn residuals(&self) -> &Col<f64> {
        &self.result().residuals
    }

    /// The regression diagnostic, when it was computed.
    fn diagnostic(&self) -> Option<&RegressionDiagnostic> {
        self.result().diagnostic.as_ref()
    }
}
