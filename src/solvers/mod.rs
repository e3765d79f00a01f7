//! Geographically weighted estimators.
//!
//! - [`GwrRegressor`]: basic GWR, and GTWR through a space-time distance
//! - [`RobustGwrRegressor`]: GWR with outlier down-weighting
//! - [`MultiscaleGwrRegressor`]: one bandwidth per coefficient, fitted by backfitting
//! - [`ScalableGwrRegressor`]: polynomial kernel approximation over k nearest neighbours
//!
//! All estimators share the local weighted least-squares solver in [`local`].

pub mod local;
mod traits;
mod gwr;
mod robust;
mod multiscale;
mod scalable;

pub use traits::{FitStage, FittedSpatialRegressor, GwrError, SpatialRegressor};
pub use gwr::{FittedGwr, GwrRegressor, GwrRegressorBuilder};
pub use robust::{FittedRobustGwr, RobustGwrRegressor, RobustGwrRegressorBuilder};
pub use multiscale::{
    BandwidthInit, FittedMultiscaleGwr, MultiscaleGwrRegressor, MultiscaleGwrRegressorBuilder,
};
pub use scalable::{FittedScalableGwr, ScalableGwrRegressor, ScalableGwrRegressorBuilder};
