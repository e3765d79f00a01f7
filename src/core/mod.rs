//! Core types for geographically weighted regression.

mod executor;
mod options;
mod progress;
mod result;

pub use executor::Executor;
pub use options::{
    BackfittingCriterion, BackfittingOptions, BandwidthCriterion, GwrOptions, GwrOptionsBuilder,
    OptionsError, ParallelStrategy,
};
pub(crate) use progress::Reporter;
pub use progress::{LogLevel, NoopSink, ProgressSink};
pub use result::{GwrResult, RegressionDiagnostic, Shat};
