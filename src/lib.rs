//! Geographically weighted regression.
//!
//! This library provides sklearn-style estimators for local regression models
//! whose coefficients vary over space (and optionally time): basic GWR,
//! geographically and temporally weighted regression (GTWR), robust GWR,
//! multiscale GWR and scalable GWR. Bandwidths are calibrated by golden-section
//! search on cross-validation or AICc; fitted models carry local standard
//! errors, t-values, p-values and a regression diagnostic.
//!
//! # Example
//!
//! ```rust,ignore
//! use gwr_rs::prelude::*;
//!
//! let locations = Locations::new(coords);
//! let fitted = GwrRegressor::builder()
//!     .spatial_weight(SpatialWeight::new(
//!         Distance::euclidean(),
//!         BandwidthWeight::adaptive(36, KernelFunction::Bisquare),
//!     ))
//!     .autoselect_bandwidth(BandwidthCriterion::Cv)
//!     .build()?
//!     .fit(&locations, &x, &y)?;
//!
//! // Local coefficients, one row per location
//! let betas = fitted.betas();
//! println!("bandwidth = {}", fitted.bandwidth());
//! println!("AICc = {}", fitted.diagnostic().map_or(f64::NAN, |d| d.aicc));
//! ```

pub mod core;
pub mod diagnostics;
pub mod inference;
pub mod selection;
pub mod solvers;
pub mod spatial;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        BackfittingCriterion, BackfittingOptions, BandwidthCriterion, GwrOptions,
        GwrOptionsBuilder, GwrResult, LogLevel, ParallelStrategy, ProgressSink,
        RegressionDiagnostic, Shat,
    };
    pub use crate::diagnostics::{calc_diagnostic, local_r_squared, studentized_residuals};
    pub use crate::selection::{GoldenSectionSelector, NelderMead, VariableForwardSelector};
    pub use crate::solvers::{
        BandwidthInit, FitStage, FittedGwr, FittedMultiscaleGwr, FittedRobustGwr,
        FittedScalableGwr, FittedSpatialRegressor, GwrError, GwrRegressor,
        MultiscaleGwrRegressor, RobustGwrRegressor, ScalableGwrRegressor, SpatialRegressor,
    };
    pub use crate::spatial::{
        BandwidthWeight, Distance, KernelFunction, Locations, SpaceTimeCombination,
        SpatialWeight,
    };
}

pub use crate::core::{BandwidthCriterion, GwrOptions, GwrResult, ParallelStrategy};
pub use crate::solvers::{
    FittedSpatialRegressor, GwrError, GwrRegressor, MultiscaleGwrRegressor, RobustGwrRegressor,
    ScalableGwrRegressor, SpatialRegressor,
};
pub use crate::spatial::{Locations, SpatialWeight};
