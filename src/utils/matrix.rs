//! Matrix utility functions.

use faer::{Col, Mat};

/// Relative pivot tolerance used when inverting small cross-product matrices.
///
/// A diagonal entry of `R` below `PIVOT_TOLERANCE * max|R_jj|` marks the
/// system as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Detect columns that are constant (zero variance).
pub fn detect_constant_columns(x: &Mat<f64>, tolerance: f64) -> Vec<bool> {
    let n_cols = x.ncols();
    let n_rows = x.nrows();

    if n_rows == 0 {
        return vec![true; n_cols];
    }

    let mut constant = vec![false; n_cols];

    for j in 0..n_cols {
        let first = x[(0, j)];
        let all_same = (1..n_rows).all(|i| (x[(i, j)] - first).abs() < tolerance);
        constant[j] = all_same;
    }

    constant
}

/// Build the design matrix, optionally prepending an intercept column.
pub fn build_design_matrix(x: &Mat<f64>, with_intercept: bool) -> Mat<f64> {
    let n = x.nrows();
    let p = x.ncols();

    if with_intercept {
        Mat::from_fn(n, p + 1, |i, j| if j == 0 { 1.0 } else { x[(i, j - 1)] })
    } else {
        x.to_owned()
    }
}

/// Center column `j` in place and return the mean that was removed.
pub fn center_column(x: &mut Mat<f64>, j: usize) -> f64 {
    let n_rows = x.nrows();
    if n_rows == 0 {
        return 0.0;
    }
    let mean = (0..n_rows).map(|i| x[(i, j)]).sum::<f64>() / n_rows as f64;
    for i in 0..n_rows {
        x[(i, j)] -= mean;
    }
    mean
}

/// Extract column `j` as an `n x 1` design matrix.
pub fn column_matrix(x: &Mat<f64>, j: usize) -> Mat<f64> {
    Mat::from_fn(x.nrows(), 1, |i, _| x[(i, j)])
}

/// Row-wise inner product `x_i . beta`.
#[inline]
pub fn row_dot(x: &Mat<f64>, i: usize, beta: &Col<f64>) -> f64 {
    (0..x.ncols()).map(|j| x[(i, j)] * beta[j]).sum()
}

/// Fitted values of a local model: `yhat_i = sum_j x_ij * beta_ij`.
pub fn fitted_values(x: &Mat<f64>, betas: &Mat<f64>) -> Col<f64> {
    Col::from_fn(x.nrows(), |i| {
        (0..x.ncols()).map(|j| x[(i, j)] * betas[(i, j)]).sum()
    })
}

/// Trace of a square matrix.
pub fn trace(m: &Mat<f64>) -> f64 {
    (0..m.nrows().min(m.ncols())).map(|i| m[(i, i)]).sum()
}

/// Invert a small symmetric positive-definite matrix through QR and
/// back-substitution.
///
/// Returns `None` when the matrix is singular or the inverse is not finite.
pub fn invert_cross_product(a: &Mat<f64>) -> Option<Mat<f64>> {
    let p = a.nrows();
    if p == 0 || a.ncols() != p {
        return None;
    }

    let qr = a.qr();
    let q = qr.compute_Q();
    let r = qr.R().to_owned();

    let scale = (0..p).map(|i| r[(i, i)].abs()).fold(0.0_f64, f64::max);
    if !scale.is_finite() || scale == 0.0 {
        return None;
    }
    if (0..p).any(|i| r[(i, i)].abs() <= PIVOT_TOLERANCE * scale) {
        return None;
    }

    let qt = q.transpose();
    let mut inv: Mat<f64> = Mat::zeros(p, p);
    for col in 0..p {
        for i in (0..p).rev() {
            let mut sum = qt[(i, col)];
            for j in (i + 1)..p {
                sum -= r[(i, j)] * inv[(j, col)];
            }
            inv[(i, col)] = sum / r[(i, i)];
        }
    }

    let finite = (0..p).all(|i| (0..p).all(|j| inv[(i, j)].is_finite()));
    finite.then_some(inv)
}

/// Median of a slice (NaN-free input assumed).
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}
