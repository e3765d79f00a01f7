//! Regression diagnostics for local models.
//!
//! This module provides:
//!
//! - **Regression diagnostic**: RSS, AIC, AICc, effective number of parameters,
//!   effective degrees of freedom, R² and adjusted R² from the hat-matrix traces
//! - **Local R²**: a kernel-weighted R² at every location
//! - **Residuals**: studentized residuals and the robust reweighting function
//!
//! # Example
//!
//! ```rust,ignore
//! use gwr_rs::diagnostics::{calc_diagnostic, studentized_residuals};
//!
//! let diag = calc_diagnostic(&x, &y, &betas, &shat);
//! println!("AICc = {}", diag.aicc);
//! ```

mod regression;
mod residuals;

pub use regression::{
    aic_from_rss, aicc, aicc_from_rss, calc_diagnostic, diagnostic_from_rss, local_r_squared, rss,
};
pub use residuals::{residual_outliers, robust_weight, studentized_residuals};
