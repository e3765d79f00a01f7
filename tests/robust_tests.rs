//! Robust GWR tests.

mod common;

use gwr_rs::solvers::{FittedSpatialRegressor, GwrRegressor, RobustGwrRegressor, SpatialRegressor};
use gwr_rs::spatial::{BandwidthWeight, Distance, KernelFunction, SpatialWeight};

const OUTLIER: usize = 37;

fn spatial_weight() -> SpatialWeight {
    SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(40, KernelFunction::Bisquare),
    )
}

fn contaminated() -> common::SpatialData {
    let mut data = common::generate_spatial_data(10, 0.1, 41);
    data.y[OUTLIER] += 50.0;
    data
}

#[test]
fn test_iterative_reweighting_downweights_outlier() {
    let data = contaminated();
    let fitted = RobustGwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .build()
        .expect("build should succeed")
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    let weights = fitted.robust_weights();
    assert!(weights[OUTLIER] < 1.0);
    assert!(weights.iter().all(|&w| (0.0..=1.0).contains(&w)));
    let kept = weights.iter().filter(|&&w| w == 1.0).count();
    assert!(kept > 80, "only {kept} observations kept full weight");
    assert!(fitted.iterations() >= 1 && fitted.iterations() <= 20);
}

#[test]
fn test_filtered_mode_removes_outlier() {
    let data = contaminated();
    let fitted = RobustGwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .filtered(true)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .expect("fit should succeed");

    assert_eq!(fitted.robust_weights()[OUTLIER], 0.0);
    assert_eq!(fitted.iterations(), 1);
    assert!(fitted.diagnostic().is_some());
}

#[test]
fn test_robust_fit_closer_to_truth_at_outlier() {
    let data = contaminated();
    let plain = GwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();
    let robust = RobustGwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .filtered(true)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    let error = |betas: &faer::Mat<f64>| (betas[(OUTLIER, 0)] - data.betas[(OUTLIER, 0)]).abs();
    assert!(error(robust.betas()) < error(plain.betas()));
}

#[test]
fn test_clean_data_keeps_full_weights() {
    let data = common::generate_spatial_data(8, 0.1, 43);
    let fitted = RobustGwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .filtered(true)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    let filtered = fitted.robust_weights().iter().filter(|&&w| w == 0.0).count();
    assert!(filtered <= 3, "{filtered} observations filtered out of clean data");
}

#[test]
fn test_predict_uses_robust_weights() {
    let data = contaminated();
    let fitted = RobustGwrRegressor::builder()
        .spatial_weight(spatial_weight())
        .filtered(true)
        .build()
        .unwrap()
        .fit(&data.locations, &data.x, &data.y)
        .unwrap();

    let predicted = fitted.predict(&data.locations).unwrap();
    assert!(common::max_abs_diff(&predicted, fitted.betas()) < 1e-10);
}
