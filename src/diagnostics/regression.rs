//! Goodness-of-fit diagnostics of local regressions.

use crate::core::{Executor, RegressionDiagnostic, Shat};
use crate::spatial::SpatialWeight;
use crate::solvers::GwrError;
use crate::utils::fitted_values;
use faer::{Col, Mat};
use std::f64::consts::PI;

/// Residual sum of squares of a local model.
pub fn rss(x: &Mat<f64>, y: &Col<f64>, betas: &Mat<f64>) -> f64 {
    let yhat = fitted_values(x, betas);
    (0..y.nrows()).map(|i| (y[i] - yhat[i]).powi(2)).sum()
}

/// Corrected AIC from the residual sum of squares and `tr(S)`.
///
/// `AICc = n ln(RSS/n) + n ln(2 pi) + n (n + tr(S)) / (n - 2 - tr(S))`
pub fn aicc_from_rss(rss: f64, n: usize, trace_s: f64) -> f64 {
    let n = n as f64;
    n * (rss / n).ln() + n * (2.0 * PI).ln() + n * (n + trace_s) / (n - 2.0 - trace_s)
}

/// AIC from the residual sum of squares and `tr(S)`.
pub fn aic_from_rss(rss: f64, n: usize, trace_s: f64) -> f64 {
    let n = n as f64;
    n * (rss / n).ln() + n * (2.0 * PI).ln() + n + trace_s
}

/// Corrected AIC of a local model.
pub fn aicc(x: &Mat<f64>, y: &Col<f64>, betas: &Mat<f64>, shat: &Shat) -> f64 {
    aicc_from_rss(rss(x, y, betas), y.nrows(), shat.trace_s)
}

/// Build the diagnostic record from a residual sum of squares.
pub fn diagnostic_from_rss(y: &Col<f64>, rss: f64, shat: &Shat) -> RegressionDiagnostic {
    let n = y.nrows();
    let nf = n as f64;
    let edf = shat.edf(n);
    let enp = shat.enp();

    let mean = y.iter().sum::<f64>() / nf;
    let tss: f64 = y.iter().map(|&yi| (yi - mean).powi(2)).sum();
    let r_squared = 1.0 - rss / tss;
    let adj_r_squared = 1.0 - (1.0 - r_squared) * (nf - 1.0) / (edf - 1.0);

    RegressionDiagnostic {
        rss,
        aic: aic_from_rss(rss, n, shat.trace_s),
        aicc: aicc_from_rss(rss, n, shat.trace_s),
        enp,
        edf,
        r_squared,
        adj_r_squared,
    }
}

/// Compute the regression diagnostic of a local model.
pub fn calc_diagnostic(
    x: &Mat<f64>,
    y: &Col<f64>,
    betas: &Mat<f64>,
    shat: &Shat,
) -> RegressionDiagnostic {
    diagnostic_from_rss(y, rss(x, y, betas), shat)
}

/// Local R² at every focus location of `sw`.
///
/// `R²_i = (sum w (y - ybar)^2 - sum w (y - yhat)^2) / sum w (y - ybar)^2`
/// with `w` the weight vector of location i. A location whose weighted
/// total sum of squares is zero gets NaN.
pub fn local_r_squared(
    exec: &Executor,
    sw: &SpatialWeight,
    y: &Col<f64>,
    fitted: &Col<f64>,
) -> Result<Col<f64>, GwrError> {
    let n = y.nrows();
    let mean = y.iter().sum::<f64>() / n as f64;
    let dybar2: Vec<f64> = y.iter().map(|&yi| (yi - mean).powi(2)).collect();
    let dyhat2: Vec<f64> = (0..n).map(|i| (y[i] - fitted[i]).powi(2)).collect();

    let values = exec.map(sw.n_focus(), |i| {
        let w = sw.weight_vector(i)?;
        let tss: f64 = (0..n).map(|k| dybar2[k] * w[k]).sum();
        let rss: f64 = (0..n).map(|k| dyhat2[k] * w[k]).sum();
        Ok(if tss > 0.0 { (tss - rss) / tss } else { f64::NAN })
    })?;
    Ok(Col::from_fn(values.len(), |i| values[i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aicc_formula() {
        let value = aicc_from_rss(50.0, 100, 10.0);
        let expected = 100.0 * 0.5f64.ln() + 100.0 * (2.0 * PI).ln() + 100.0 * 110.0 / 88.0;
        assert!((value - expected).abs() < 1e-10);
    }

    #[test]
    fn test_diagnostic_global_model() {
        // A constant-coefficient fit with tr(S) = tr(S'S) = p behaves like OLS.
        let n = 20;
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { i as f64 });
        let y = Col::from_fn(n, |i| 1.0 + 2.0 * i as f64 + if i % 2 == 0 { 0.5 } else { -0.5 });
        let betas = Mat::from_fn(n, 2, |_, j| if j == 0 { 1.0 } else { 2.0 });
        let shat = Shat::new(2.0, 2.0);

        let diag = calc_diagnostic(&x, &y, &betas, &shat);
        assert!((diag.rss - 5.0).abs() < 1e-10);
        assert!((diag.enp - 2.0).abs() < 1e-12);
        assert!((diag.edf - 18.0).abs() < 1e-12);
        assert!(diag.r_squared > 0.99 && diag.r_squared < 1.0);
        assert!(diag.adj_r_squared < diag.r_squared);
        assert!((diag.aic - aic_from_rss(5.0, n, 2.0)).abs() < 1e-10);
        assert!((diag.aicc - aicc(&x, &y, &betas, &shat)).abs() < 1e-10);
    }

    fn line_weight(n: usize) -> SpatialWeight {
        use crate::spatial::{BandwidthWeight, Distance, KernelFunction, Locations};
        let loc = Locations::new(Mat::from_fn(n, 2, |i, j| if j == 0 { i as f64 } else { 0.0 }));
        let mut sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::adaptive(4, KernelFunction::Bisquare),
        );
        sw.bind(&loc, &loc).unwrap();
        sw
    }

    #[test]
    fn test_local_r_squared_parallel_matches_serial() {
        use crate::core::ParallelStrategy;
        let sw = line_weight(12);
        let y = Col::from_fn(12, |i| (i * i % 7) as f64);
        let fitted = Col::from_fn(12, |i| y[i] + if i % 2 == 0 { 0.3 } else { -0.2 });

        let serial = local_r_squared(&Executor::serial(), &sw, &y, &fitted).unwrap();
        let pool = Executor::new(ParallelStrategy::Parallel { threads: 3 }).unwrap();
        let parallel = local_r_squared(&pool, &sw, &y, &fitted).unwrap();
        for i in 0..12 {
            assert!(serial[i] <= 1.0);
            assert_eq!(serial[i], parallel[i]);
        }
    }

    #[test]
    fn test_local_r_squared_zero_local_variation_is_nan() {
        // The window of location 0 covers observations 0..=2, all at the mean.
        let sw = line_weight(8);
        let y = Col::from_fn(8, |i| if i < 4 { 1.0 } else { 1.0 + (i as f64 - 5.5) });
        let fitted = y.clone();
        let r2 = local_r_squared(&Executor::serial(), &sw, &y, &fitted).unwrap();
        assert!(r2[0].is_nan());
        assert!(r2[7].is_finite());
    }

    #[test]
    fn test_zero_traces_leave_adjusted_equal() {
        let y = Col::from_fn(10, |i| i as f64);
        let diag = diagnostic_from_rss(&y, 10.0, &Shat::default());
        assert!((diag.adj_r_squared - diag.r_squared).abs() < 1e-12);
    }
}
