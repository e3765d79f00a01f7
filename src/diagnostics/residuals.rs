//! Studentized residuals and the robust reweighting function.

use faer::Col;

/// Compute internally studentized residuals: e_i / sqrt(sigma2 * q_ii)
///
/// `q_diag` is the diagonal of `(I - S)'(I - S)` and `sigma2` the residual
/// variance `RSS / (n - 2 tr(S) + tr(S'S))`.
pub fn studentized_residuals(residuals: &Col<f64>, q_diag: &Col<f64>, sigma2: f64) -> Col<f64> {
    let n = residuals.nrows();

    if sigma2 <= 0.0 || !sigma2.is_finite() {
        return Col::from_fn(n, |_| f64::NAN);
    }

    Col::from_fn(n, |i| {
        let denominator = (sigma2 * q_diag[i]).max(1e-28).sqrt();
        residuals[i] / denominator
    })
}

/// Robust weight of a standardized residual magnitude `r`.
///
/// `1` up to 2, `(1 - (r - 2)^2)^2` between 2 and 3, `0` from 3 on.
#[inline]
pub fn robust_weight(r: f64) -> f64 {
    let r = r.abs();
    if r <= 2.0 {
        1.0
    } else if r < 3.0 {
        let t = 1.0 - (r - 2.0) * (r - 2.0);
        t * t
    } else {
        0.0
    }
}

/// Indices of observations whose studentized residual exceeds `threshold`
/// in absolute value.
pub fn residual_outliers(studentized: &Col<f64>, threshold: f64) -> Vec<usize> {
    (0..studentized.nrows())
        .filter(|&i| studentized[i].abs() > threshold)
        .collect()
}
