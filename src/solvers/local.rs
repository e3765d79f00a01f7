//! Local weighted least squares.
//!
//! At every focus location i the local coefficients solve
//!
//! ```text
//! (X' W_i X) beta_i = X' W_i y
//! ```
//!
//! With hat-matrix tracking the solver also yields the projection
//! `C_i = (X' W_i X)^-1 X' W_i`, the hat row `s_i = x_i' C_i` and the
//! coefficient variance factors `sum_k C_i[j, k]^2`.

use super::traits::{FitStage, GwrError};
use crate::core::{Executor, Shat};
use crate::spatial::SpatialWeight;
use crate::utils::invert_cross_product;
use faer::{Col, Mat};

/// The assembled weighted normal equations of one location.
#[derive(Debug, Clone)]
pub struct LocalSystem {
    xtw: Mat<f64>,
    inverse: Mat<f64>,
    xtwy: Col<f64>,
}

impl LocalSystem {
    /// Assemble and invert `X'WX` for one location.
    ///
    /// Fails with `SingularSystem` when `X'WX` is not invertible.
    pub fn assemble(
        x: &Mat<f64>,
        y: &Col<f64>,
        w: &Col<f64>,
        location: usize,
    ) -> Result<Self, GwrError> {
        let n = x.nrows();
        let p = x.ncols();
        let xtw: Mat<f64> = Mat::from_fn(p, n, |j, k| x[(k, j)] * w[k]);
        let xtwx = &xtw * x;
        let xtwy = &xtw * y;

        let inverse = invert_cross_product(&xtwx).ok_or(GwrError::SingularSystem {
            stage: FitStage::LocalSolve,
            location,
        })?;

        Ok(Self {
            xtw,
            inverse,
            xtwy,
        })
    }

    /// `(X'WX)^-1`.
    pub fn inverse(&self) -> &Mat<f64> {
        &self.inverse
    }

    /// Local coefficients.
    pub fn beta(&self) -> Col<f64> {
        &self.inverse * &self.xtwy
    }

    /// The projection `C = (X'WX)^-1 X'W` (p x n).
    pub fn projection(&self) -> Mat<f64> {
        &self.inverse * &self.xtw
    }
}

fn check_finite(beta: &Col<f64>, stage: FitStage, location: usize) -> Result<(), GwrError> {
    if beta.iter().all(|b| b.is_finite()) {
        Ok(())
    } else {
        Err(GwrError::NonFiniteResult {
            stage,
            location: Some(location),
        })
    }
}

/// Solve the local regression with weights `w`.
pub fn solve(
    x: &Mat<f64>,
    y: &Col<f64>,
    w: &Col<f64>,
    location: usize,
) -> Result<Col<f64>, GwrError> {
    let beta = LocalSystem::assemble(x, y, w, location)?.beta();
    check_finite(&beta, FitStage::LocalSolve, location)?;
    Ok(beta)
}

/// A local solution together with its hat-matrix quantities.
#[derive(Debug, Clone)]
pub struct HatRow {
    /// Local coefficients.
    pub beta: Col<f64>,
    /// Hat row `s_i` (length n).
    pub s: Col<f64>,
    /// Row sums of `C_i . C_i` (length p).
    pub variance_factors: Col<f64>,
}

/// Solve the local regression and compute its hat row.
pub fn solve_with_hat(
    x: &Mat<f64>,
    y: &Col<f64>,
    w: &Col<f64>,
    focus: usize,
) -> Result<HatRow, GwrError> {
    let system = LocalSystem::assemble(x, y, w, focus)?;
    let beta = system.beta();
    check_finite(&beta, FitStage::LocalSolve, focus)?;

    let c = system.projection();
    let n = c.ncols();
    let p = c.nrows();
    let variance_factors = Col::from_fn(p, |j| (0..n).map(|k| c[(j, k)] * c[(j, k)]).sum());
    let s = Col::from_fn(n, |k| (0..p).map(|j| x[(focus, j)] * c[(j, k)]).sum());

    Ok(HatRow {
        beta,
        s,
        variance_factors,
    })
}

// ============================================================================
// Per-location Loops
// ============================================================================

/// Weight vector at `focus`, optionally scaled by per-observation weights.
pub(crate) fn local_weights(
    sw: &SpatialWeight,
    focus: usize,
    observation_weights: Option<&Col<f64>>,
) -> Result<Col<f64>, GwrError> {
    let w = sw.weight_vector(focus)?;
    Ok(match observation_weights {
        Some(mask) => Col::from_fn(w.nrows(), |k| w[k] * mask[k]),
        None => w,
    })
}

/// Local coefficients at every focus location of `sw` (no hat matrix).
pub(crate) fn fit_coefficients(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    observation_weights: Option<&Col<f64>>,
) -> Result<Mat<f64>, GwrError> {
    let rows = exec.map(sw.n_focus(), |i| {
        let w = local_weights(sw, i, observation_weights)?;
        solve(x, y, &w, i)
    })?;
    Ok(Mat::from_fn(rows.len(), x.ncols(), |i, j| rows[i][j]))
}

/// Everything a fit with hat-matrix tracking produces.
#[derive(Debug, Clone)]
pub(crate) struct HatFit {
    pub betas: Mat<f64>,
    /// Row sums of `C_i . C_i`, one row per location.
    pub variance_factors: Mat<f64>,
    pub shat: Shat,
    /// Diagonal of `(I - S)'(I - S)`, used for studentized residuals.
    pub q_diag: Col<f64>,
    /// Full hat matrix when storage was requested.
    pub hat_matrix: Option<Mat<f64>>,
}

struct HatPartial {
    rows: Vec<(Col<f64>, Col<f64>, Option<Col<f64>>)>,
    trace_s: f64,
    trace_sts: f64,
    q_diag: Vec<f64>,
}

/// Local fits at every training location with hat-matrix accumulation.
///
/// Requires focus and reference locations to coincide.
pub(crate) fn fit_with_hat(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    observation_weights: Option<&Col<f64>>,
    store_s: bool,
) -> Result<HatFit, GwrError> {
    let n = x.nrows();
    let p = x.ncols();

    let partial = exec.fold(
        n,
        || HatPartial {
            rows: Vec::new(),
            trace_s: 0.0,
            trace_sts: 0.0,
            q_diag: vec![0.0; n],
        },
        |acc: &mut HatPartial, i: usize| {
            let w = local_weights(sw, i, observation_weights)?;
            let row = solve_with_hat(x, y, &w, i)?;
            acc.trace_s += row.s[i];
            acc.trace_sts += row.s.iter().map(|v| v * v).sum::<f64>();
            for k in 0..n {
                let delta = if k == i { 1.0 } else { 0.0 };
                let q = delta - row.s[k];
                acc.q_diag[k] += q * q;
            }
            let s = store_s.then(|| row.s.clone());
            acc.rows.push((row.beta, row.variance_factors, s));
            Ok(())
        },
        |mut left: HatPartial, right: HatPartial| {
            left.rows.extend(right.rows);
            left.trace_s += right.trace_s;
            left.trace_sts += right.trace_sts;
            for (l, r) in left.q_diag.iter_mut().zip(right.q_diag) {
                *l += r;
            }
            left
        },
    )?;

    let rows = &partial.rows;
    let betas = Mat::from_fn(n, p, |i, j| rows[i].0[j]);
    let variance_factors = Mat::from_fn(n, p, |i, j| rows[i].1[j]);
    let hat_matrix = if store_s {
        let mut s = Mat::zeros(n, n);
        for (i, row) in rows.iter().enumerate() {
            if let Some(si) = &row.2 {
                for k in 0..n {
                    s[(i, k)] = si[k];
                }
            }
        }
        Some(s)
    } else {
        None
    };

    Ok(HatFit {
        betas,
        variance_factors,
        shat: Shat::new(partial.trace_s, partial.trace_sts),
        q_diag: Col::from_fn(n, |k| partial.q_diag[k]),
        hat_matrix,
    })
}
