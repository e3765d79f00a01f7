//! Multiscale GWR tests.

mod common;

use approx::assert_relative_eq;
use faer::{Col, Mat};
use gwr_rs::core::{BackfittingCriterion, BackfittingOptions, BandwidthCriterion};
use gwr_rs::solvers::{
    BandwidthInit, FittedSpatialRegressor, GwrError, MultiscaleGwrRegressor, SpatialRegressor,
};
use gwr_rs::spatial::{BandwidthWeight, Distance, KernelFunction, SpatialWeight};

fn adaptive_bisquare(k: usize) -> SpatialWeight {
    SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(k, KernelFunction::Bisquare),
    )
}

fn backfitting(max_iterations: usize) -> BackfittingOptions {
    BackfittingOptions {
        max_iterations,
        ..BackfittingOptions::default()
    }
}

// ============================================================================
// Backfitting
// ============================================================================

#[test]
fn test_backfitting_hat_matrix_invariants() {
    let data = common::generate_spatial_data(8, 0.1, 51);
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(64); 3])
        .backfitting(backfitting(10))
        .build()
        .expect("build should succeed")
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    let result = fitted.result();
    let s0 = result.hat_matrix.as_ref().expect("hat matrix should be tracked");
    let sy = s0 * &data.y;
    for i in 0..64 {
        assert_relative_eq!(sy[i], result.fitted_values[i], epsilon = 1e-6);
    }
    let shat = result.shat.expect("shat should be computed");
    assert_relative_eq!(shat.trace_s, common::trace(s0), epsilon = 1e-10);

    let diag = fitted.diagnostic().expect("diagnostic should be computed");
    assert!(diag.aicc.is_finite());
    assert!(diag.r_squared > 0.5 && diag.r_squared <= 1.0);

    let se = result.std_errors.as_ref().unwrap();
    assert!(se.col(0).iter().all(|v| v.is_finite() && *v > 0.0));
}

#[test]
fn test_backfitting_history() {
    let data = common::generate_spatial_data(8, 0.1, 52);
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(64); 3])
        .backfitting(backfitting(10))
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    let iterations = fitted.iterations();
    assert!(iterations >= 1 && iterations <= 10);
    assert_eq!(fitted.rss_history().len(), iterations);
    assert_eq!(fitted.criterion_history().len(), iterations);
    let last = *fitted.criterion_history().last().unwrap();
    assert!(iterations == 10 || last <= 1e-6);
    assert_relative_eq!(
        *fitted.rss_history().last().unwrap(),
        fitted.result().rss(),
        epsilon = 1e-10
    );

    let bandwidths = fitted.bandwidths();
    assert_eq!(bandwidths.len(), 3);
    for bw in bandwidths {
        assert!((10.0..=64.0).contains(&bw), "bandwidth {bw}");
        assert_eq!(bw, bw.round());
    }
}

#[test]
fn test_cvr_criterion() {
    let data = common::generate_spatial_data(7, 0.2, 53);
    let options = BackfittingOptions {
        max_iterations: 6,
        criterion: BackfittingCriterion::Cvr,
        ..BackfittingOptions::default()
    };
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(49); 3])
        .backfitting(options)
        .hat_matrix(false)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    let rss = fitted.rss_history();
    let crit = fitted.criterion_history();
    for k in 1..rss.len() {
        assert_relative_eq!(crit[k], (rss[k] - rss[k - 1]).abs(), epsilon = 1e-12);
        assert!(
            rss[k] <= rss[k - 1] * (1.0 + 1e-2),
            "RSS rose from {} to {} at iteration {}",
            rss[k - 1],
            rss[k],
            k + 1
        );
    }
    // Diagnostic without hat matrix uses zero traces.
    assert!(fitted.result().hat_matrix.is_none());
    assert!(fitted.result().std_errors.is_none());
    let diag = fitted.diagnostic().unwrap();
    assert_relative_eq!(diag.r_squared, diag.adj_r_squared, epsilon = 1e-12);
}

#[test]
fn test_dummy_predictor_standard_errors() {
    // Uncentred 0/1 dummy: a third of the rows have x = 0 for coefficient 1.
    let data = common::generate_spatial_data(8, 0.1, 57);
    let x = Mat::from_fn(64, 2, |i, j| match j {
        0 => {
            if i % 3 == 0 {
                0.0
            } else {
                1.0
            }
        }
        _ => data.x[(i, 1)],
    });
    let y = Col::from_fn(64, |i| {
        data.betas[(i, 0)] + data.betas[(i, 1)] * x[(i, 0)] + data.betas[(i, 2)] * x[(i, 1)]
            + 0.1 * data.x[(i, 0)]
    });

    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(64); 3])
        .predictor_centered(vec![false; 3])
        .backfitting(backfitting(5))
        .build()
        .unwrap()
        .fit(&data.locations, &x, &y)
        .expect("fit should succeed");

    let result = fitted.result();
    let se = result.std_errors.as_ref().expect("standard errors");
    let p_values = result.p_values.as_ref().expect("p-values");
    for k in 0..3 {
        for i in 0..64 {
            assert!(
                se[(i, k)].is_finite() && se[(i, k)] > 0.0,
                "se[{i}, {k}] = {}",
                se[(i, k)]
            );
            assert!((0.0..=1.0).contains(&p_values[(i, k)]));
        }
    }

    let s0 = result.hat_matrix.as_ref().unwrap();
    let sy = s0 * &y;
    for i in 0..64 {
        assert_relative_eq!(sy[i], result.fitted_values[i], epsilon = 1e-6);
    }
}

#[test]
fn test_failed_variable_selection_keeps_default_bandwidth() {
    // The second predictor is nonzero at a single observation, so every
    // leave-one-out bandwidth for its one-column model is singular.
    let data = common::generate_spatial_data(8, 0.1, 58);
    let x = Mat::from_fn(64, 2, |i, j| match j {
        0 => data.x[(i, 0)],
        _ => {
            if i == 27 {
                1.0
            } else {
                0.0
            }
        }
    });
    let gaussian = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(64, KernelFunction::Gaussian),
    );

    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![gaussian; 3])
        .bandwidth_criteria(vec![
            BandwidthCriterion::Aic,
            BandwidthCriterion::Aic,
            BandwidthCriterion::Cv,
        ])
        .predictor_centered(vec![false; 3])
        .hat_matrix(false)
        .backfitting(backfitting(3))
        .build()
        .unwrap()
        .fit(&data.locations, &x, &data.y)
        .expect("a failed per-variable search should not abort the fit");

    assert_eq!(fitted.bandwidths()[2], 64.0);
    assert!(fitted.bandwidth_criterion_list(2).is_empty());
    assert_ne!(fitted.bandwidth_init()[2], BandwidthInit::Specified);
    assert!(fitted.iterations() >= 1);
    assert!(fitted.betas().col(2).iter().all(|b| b.is_finite()));
}

#[test]
fn test_stable_bandwidths_freeze() {
    let data = common::generate_spatial_data(7, 0.2, 59);
    let options = BackfittingOptions {
        max_iterations: 4,
        retry_times: 1,
        ..BackfittingOptions::default()
    };
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(49); 3])
        .bandwidth_thresholds(vec![1e9; 3])
        .hat_matrix(false)
        .backfitting(options)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    assert!(fitted
        .bandwidth_init()
        .iter()
        .all(|&s| s == BandwidthInit::Specified));
    for k in 0..3 {
        assert!(!fitted.bandwidth_criterion_list(k).is_empty());
    }
}

#[test]
fn test_specified_bandwidths_are_kept() {
    let data = common::generate_spatial_data(7, 0.1, 54);
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(30); 3])
        .bandwidth_init(vec![BandwidthInit::Specified; 3])
        .bandwidth_criteria(vec![BandwidthCriterion::Aic; 3])
        .backfitting(backfitting(5))
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    assert_eq!(fitted.bandwidths(), vec![30.0, 30.0, 30.0]);
    assert!(fitted
        .bandwidth_init()
        .iter()
        .all(|&s| s == BandwidthInit::Specified));
    assert!(fitted.bandwidth_criterion_list(0).is_empty());
}

#[test]
fn test_global_model_and_prediction() {
    let data = common::generate_global_data(7, 55);
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(49); 3])
        .backfitting(backfitting(5))
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    let means = fitted.predictor_means();
    assert_eq!(means[0], 0.0);
    let intercept = 1.0 + 2.0 * means[1] - means[2];
    let betas = fitted.betas();
    for i in 0..49 {
        assert_relative_eq!(betas[(i, 0)], intercept, epsilon = 1e-6);
        assert_relative_eq!(betas[(i, 1)], 2.0, epsilon = 1e-6);
        assert_relative_eq!(betas[(i, 2)], -1.0, epsilon = 1e-6);
    }

    let predicted = fitted.predict(&data.locations).expect("predict should succeed");
    assert!(common::max_abs_diff(&predicted, betas) < 1e-6);
}

#[test]
fn test_uncentered_predictors() {
    let data = common::generate_global_data(6, 56);
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(36); 3])
        .predictor_centered(vec![false; 3])
        .backfitting(backfitting(3))
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    assert!(fitted.predictor_means().iter().all(|&m| m == 0.0));
    assert!(common::max_abs_diff(fitted.betas(), &data.betas) < 1e-6);
}

#[test]
fn test_fixed_bandwidths() {
    let data = common::generate_spatial_data(6, 0.1, 57);
    let sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::fixed(3.0, KernelFunction::Gaussian),
    );
    let fitted = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![sw; 3])
        .backfitting(backfitting(3))
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    let max_distance = 50f64.sqrt();
    for bw in fitted.bandwidths() {
        assert!(bw > 0.0 && bw <= max_distance, "bandwidth {bw}");
    }
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_per_variable_array_lengths() {
    let data = common::generate_spatial_data(6, 0.1, 58);
    let result = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(20); 3])
        .bandwidth_criteria(vec![BandwidthCriterion::Cv; 2])
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y);
    assert!(matches!(result, Err(GwrError::InvalidConfiguration(_))));

    let result = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(20); 3])
        .bandwidth_thresholds(vec![1e-5; 4])
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y);
    assert!(matches!(result, Err(GwrError::InvalidConfiguration(_))));
}

#[test]
fn test_invalid_backfitting_options() {
    let options = BackfittingOptions {
        criterion_threshold: 0.0,
        ..BackfittingOptions::default()
    };
    let result = MultiscaleGwrRegressor::builder()
        .spatial_weights(vec![adaptive_bisquare(20); 3])
        .backfitting(options)
        .build();
    assert!(matches!(result, Err(GwrError::InvalidOptions(_))));
}
