//! Bandwidth, parameter and variable selection.
//!
//! - [`GoldenSectionSelector`]: one-dimensional bandwidth search
//! - [`criterion`]: cross-validation and AICc evaluators driving the search
//! - [`NelderMead`]: two-parameter simplex used by the scalable model
//! - [`VariableForwardSelector`]: greedy AICc-based variable selection

pub mod criterion;
mod golden;
mod simplex;
mod variables;

pub use crate::core::BandwidthCriterion;
pub use golden::GoldenSectionSelector;
pub use simplex::{NelderMead, SimplexResult};
pub use variables::{variables_criterion, VariableCriterion, VariableForwardSelector};
