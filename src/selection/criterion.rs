//! Bandwidth selection criteria.
//!
//! Both criteria run one pass of local solves over every training location.
//! Numerical failures (a singular local system, a non-finite value) turn the
//! criterion into `+inf` so the search rejects the bandwidth and moves on.

use crate::core::{BandwidthCriterion, Executor};
use crate::diagnostics::aicc_from_rss;
use crate::solvers::local::LocalSystem;
use crate::solvers::GwrError;
use crate::spatial::{BandwidthWeight, SpatialWeight};
use faer::{Col, Mat};

/// Map numerical failures to `+inf`, keep configuration errors.
fn reject_numerical(result: Result<f64, GwrError>) -> Result<f64, GwrError> {
    match result {
        Ok(value) if value.is_finite() => Ok(value),
        Ok(_) => Ok(f64::INFINITY),
        Err(e) if e.is_numerical() => Ok(f64::INFINITY),
        Err(e) => Err(e),
    }
}

fn candidate_weights(
    sw: &SpatialWeight,
    weight: &BandwidthWeight,
    focus: usize,
    observation_weights: Option<&Col<f64>>,
) -> Result<Col<f64>, GwrError> {
    let w = sw.weight_vector_with(weight, focus)?;
    Ok(match observation_weights {
        Some(mask) => Col::from_fn(w.nrows(), |k| w[k] * mask[k]),
        None => w,
    })
}

/// Leave-one-out cross-validation: `sum (y_i - x_i' beta_{-i})^2`.
pub fn cv(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    weight: &BandwidthWeight,
    observation_weights: Option<&Col<f64>>,
) -> Result<f64, GwrError> {
    let p = x.ncols();
    let value = exec.fold(
        x.nrows(),
        || 0.0,
        |acc: &mut f64, i: usize| {
            let mut w = candidate_weights(sw, weight, i, observation_weights)?;
            w[i] = 0.0;
            let beta = LocalSystem::assemble(x, y, &w, i)?.beta();
            let yhat: f64 = (0..p).map(|j| x[(i, j)] * beta[j]).sum();
            let res = y[i] - yhat;
            *acc += res * res;
            Ok(())
        },
        |left, right| left + right,
    );
    reject_numerical(value)
}

/// Corrected AIC of the fit at a candidate bandwidth.
pub fn aic(
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    weight: &BandwidthWeight,
    observation_weights: Option<&Col<f64>>,
) -> Result<f64, GwrError> {
    let n = x.nrows();
    let p = x.ncols();
    let value = exec.fold(
        n,
        || (0.0, 0.0),
        |acc: &mut (f64, f64), i: usize| {
            let w = candidate_weights(sw, weight, i, observation_weights)?;
            let system = LocalSystem::assemble(x, y, &w, i)?;
            let beta = system.beta();
            let yhat: f64 = (0..p).map(|j| x[(i, j)] * beta[j]).sum();
            // s_ii = x_i' (X'WX)^-1 x_i w_i
            let inv = system.inverse();
            let quad: f64 = (0..p)
                .map(|j| x[(i, j)] * (0..p).map(|k| inv[(j, k)] * x[(i, k)]).sum::<f64>())
                .sum();
            acc.0 += (y[i] - yhat).powi(2);
            acc.1 += quad * w[i];
            Ok(())
        },
        |left, right| (left.0 + right.0, left.1 + right.1),
    );
    reject_numerical(value.map(|(rss, trace_s)| aicc_from_rss(rss, n, trace_s)))
}

/// Evaluate `criterion` at a candidate bandwidth.
pub fn evaluate(
    criterion: BandwidthCriterion,
    exec: &Executor,
    x: &Mat<f64>,
    y: &Col<f64>,
    sw: &SpatialWeight,
    weight: &BandwidthWeight,
    observation_weights: Option<&Col<f64>>,
) -> Result<f64, GwrError> {
    match criterion {
        BandwidthCriterion::Cv => cv(exec, x, y, sw, weight, observation_weights),
        BandwidthCriterion::Aic => aic(exec, x, y, sw, weight, observation_weights),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::{Distance, KernelFunction, Locations};

    fn setup(n: usize) -> (Mat<f64>, Col<f64>, SpatialWeight) {
        let coords = Mat::from_fn(n, 2, |i, j| if j == 0 { (i % 5) as f64 } else { (i / 5) as f64 });
        let loc = Locations::new(coords);
        let x = Mat::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { ((i * 7) % 11) as f64 });
        let y = Col::from_fn(n, |i| 1.0 + 0.5 * x[(i, 1)] + ((i * 3) % 5) as f64 * 0.1);
        let mut sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::adaptive(n, KernelFunction::Gaussian),
        );
        sw.bind(&loc, &loc).unwrap();
        (x, y, sw)
    }

    #[test]
    fn test_cv_positive_and_finite() {
        let (x, y, sw) = setup(25);
        let weight = BandwidthWeight::adaptive(15, KernelFunction::Bisquare);
        let value = cv(&Executor::serial(), &x, &y, &sw, &weight, None).unwrap();
        assert!(value.is_finite());
        assert!(value > 0.0);
    }

    #[test]
    fn test_singular_bandwidth_is_infinite() {
        let (x, y, sw) = setup(25);
        // One neighbour under a bounded kernel leaves only the focus point.
        let weight = BandwidthWeight::adaptive(1, KernelFunction::Boxcar);
        let value = cv(&Executor::serial(), &x, &y, &sw, &weight, None).unwrap();
        assert_eq!(value, f64::INFINITY);
        let value = aic(&Executor::serial(), &x, &y, &sw, &weight, None).unwrap();
        assert_eq!(value, f64::INFINITY);
    }

    #[test]
    fn test_aic_matches_formula_for_global_fit() {
        let (x, y, sw) = setup(25);
        // A huge fixed Boxcar bandwidth weighs every point equally: OLS with tr(S) = p.
        let weight = BandwidthWeight::fixed(1e6, KernelFunction::Boxcar);
        let value = aic(&Executor::serial(), &x, &y, &sw, &weight, None).unwrap();

        let beta = LocalSystem::assemble(&x, &y, &Col::from_fn(25, |_| 1.0), 0)
            .unwrap()
            .beta();
        let rss: f64 = (0..25)
            .map(|i| (y[i] - x[(i, 0)] * beta[0] - x[(i, 1)] * beta[1]).powi(2))
            .sum();
        assert!((value - aicc_from_rss(rss, 25, 2.0)).abs() < 1e-8);
    }

    #[test]
    fn test_parallel_matches_serial() {
        let (x, y, sw) = setup(25);
        let weight = BandwidthWeight::adaptive(12, KernelFunction::Gaussian);
        let parallel = Executor::new(crate::core::ParallelStrategy::Parallel { threads: 3 }).unwrap();
        let a = evaluate(BandwidthCriterion::Cv, &Executor::serial(), &x, &y, &sw, &weight, None).unwrap();
        let b = evaluate(BandwidthCriterion::Cv, &parallel, &x, &y, &sw, &weight, None).unwrap();
        assert!((a - b).abs() < 1e-9 * a.abs().max(1.0));
    }
}
