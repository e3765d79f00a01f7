//! Statistical inference for local coefficients (standard errors, t-values, p-values).

mod coefficient;

pub use coefficient::{residual_variance, CoefficientInference};
