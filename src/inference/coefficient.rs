//! Local coefficient inference.

use faer::Mat;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Computes inference statistics for local coefficients.
///
/// All matrices are n x p with one row per location.
pub struct CoefficientInference;

impl CoefficientInference {
    /// Standard errors of the local coefficients.
    ///
    /// SE(β_ij) = sqrt(σ² * v_ij) where `v_ij` are the variance factors
    /// `sum_k C_i[j, k]^2`.
    pub fn standard_errors(variance_factors: &Mat<f64>, sigma2: f64) -> Mat<f64> {
        Mat::from_fn(variance_factors.nrows(), variance_factors.ncols(), |i, j| {
            let var = sigma2 * variance_factors[(i, j)];
            if var >= 0.0 {
                var.sqrt()
            } else {
                f64::NAN
            }
        })
    }

    /// Compute t-statistics: t_ij = β_ij / SE(β_ij)
    pub fn t_statistics(betas: &Mat<f64>, std_errors: &Mat<f64>) -> Mat<f64> {
        Mat::from_fn(betas.nrows(), betas.ncols(), |i, j| {
            let se = std_errors[(i, j)];
            if se.is_nan() || se == 0.0 {
                f64::NAN
            } else {
                betas[(i, j)] / se
            }
        })
    }

    /// Compute two-sided p-values from t-statistics.
    ///
    /// p_ij = 2 * P(|T| > |t_ij|) where T ~ t(df)
    pub fn p_values(t_statistics: &Mat<f64>, df: f64) -> Mat<f64> {
        let (n, p) = (t_statistics.nrows(), t_statistics.ncols());

        let t_dist = match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) if df > 0.0 => dist,
            _ => return Mat::from_fn(n, p, |_, _| f64::NAN),
        };

        Mat::from_fn(n, p, |i, j| {
            let t = t_statistics[(i, j)];
            if t.is_nan() {
                f64::NAN
            } else {
                2.0 * (1.0 - t_dist.cdf(t.abs()))
            }
        })
    }
}

/// Residual variance `RSS / (n - 2 tr(S) + tr(S'S))`.
pub fn residual_variance(rss: f64, edf: f64) -> f64 {
    if edf > 0.0 {
        rss / edf
    } else {
        f64::NAN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_errors() {
        let factors = Mat::from_fn(2, 2, |i, j| (i + j + 1) as f64);
        let se = CoefficientInference::standard_errors(&factors, 4.0);
        assert!((se[(0, 0)] - 2.0).abs() < 1e-12);
        assert!((se[(1, 1)] - 12.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_t_statistics_zero_se() {
        let betas = Mat::from_fn(1, 2, |_, j| j as f64 + 1.0);
        let se = Mat::from_fn(1, 2, |_, j| if j == 0 { 0.0 } else { 0.5 });
        let t = CoefficientInference::t_statistics(&betas, &se);
        assert!(t[(0, 0)].is_nan());
        assert!((t[(0, 1)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_p_values() {
        let t = Mat::from_fn(1, 3, |_, j| [0.0, 1.96, f64::NAN][j]);
        let p = CoefficientInference::p_values(&t, 1e6);
        assert!((p[(0, 0)] - 1.0).abs() < 1e-10);
        assert!((p[(0, 1)] - 0.05).abs() < 1e-3);
        assert!(p[(0, 2)].is_nan());

        let p = CoefficientInference::p_values(&t, 0.0);
        assert!(p[(0, 0)].is_nan());
    }

    #[test]
    fn test_residual_variance() {
        assert!((residual_variance(10.0, 5.0) - 2.0).abs() < 1e-12);
        assert!(residual_variance(10.0, 0.0).is_nan());
    }
}
