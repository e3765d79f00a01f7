//! Distance, kernel and spatial weight tests.

mod common;

use approx::assert_relative_eq;
use faer::{Col, Mat};
use gwr_rs::solvers::GwrError;
use gwr_rs::spatial::{
    BandwidthWeight, Distance, KernelFunction, Locations, Metric, SpaceTimeCombination,
    SpatialWeight,
};

fn points(coords: &[[f64; 2]]) -> Locations {
    Locations::new(Mat::from_fn(coords.len(), 2, |i, j| coords[i][j]))
}

fn distances(distance: Distance, focus: &Locations, reference: &Locations) -> Col<f64> {
    let mut sw = SpatialWeight::new(
        distance,
        BandwidthWeight::fixed(1.0, KernelFunction::Gaussian),
    );
    sw.bind(focus, reference).expect("bind should succeed");
    sw.distance_vector(0).expect("distances should be available")
}

// ============================================================================
// Distances
// ============================================================================

#[test]
fn test_euclidean_distance() {
    let focus = points(&[[0.0, 0.0]]);
    let reference = points(&[[3.0, 4.0], [0.0, 0.0], [-6.0, 8.0]]);
    let d = distances(Distance::euclidean(), &focus, &reference);
    assert_relative_eq!(d[0], 5.0, epsilon = 1e-12);
    assert_eq!(d[1], 0.0);
    assert_relative_eq!(d[2], 10.0, epsilon = 1e-12);
}

#[test]
fn test_great_circle_distance() {
    let focus = points(&[[0.0, 0.0]]);
    let reference = points(&[[1.0, 0.0], [0.0, 0.0], [0.0, 1.0]]);
    let d = distances(Distance::great_circle(), &focus, &reference);
    // One degree along the equator and along a meridian, in kilometres.
    assert!(d[0] > 110.0 && d[0] < 112.0, "got {}", d[0]);
    assert_eq!(d[1], 0.0);
    assert!(d[2] > 110.0 && d[2] < 112.0, "got {}", d[2]);
    assert!(d[0] > d[2]);
}

#[test]
fn test_great_circle_symmetry() {
    let a = points(&[[114.3, 30.5]]);
    let b = points(&[[116.4, 39.9]]);
    let ab = distances(Distance::great_circle(), &a, &b)[0];
    let ba = distances(Distance::great_circle(), &b, &a)[0];
    assert_relative_eq!(ab, ba, epsilon = 1e-9);
    assert!(ab > 1000.0 && ab < 1100.0, "got {ab}");
}

#[test]
fn test_minkowski_manhattan() {
    let focus = points(&[[0.0, 0.0]]);
    let reference = points(&[[3.0, -4.0]]);
    let d = distances(Distance::minkowski(1.0, 0.0), &focus, &reference);
    assert_relative_eq!(d[0], 7.0, epsilon = 1e-12);

    let d = distances(Distance::minkowski(2.0, 0.7), &focus, &reference);
    assert_relative_eq!(d[0], 5.0, epsilon = 1e-12);
}

#[test]
fn test_space_time_distance() {
    let focus = points(&[[0.0, 0.0]]).with_times(Col::from_fn(1, |_| 0.0));
    let reference = points(&[[3.0, 4.0]]).with_times(Col::from_fn(1, |_| 2.0));

    let orthogonal = distances(
        Distance::space_time(Metric::Euclidean, 0.5, SpaceTimeCombination::Orthogonal),
        &focus,
        &reference,
    );
    assert_relative_eq!(orthogonal[0], 14.5f64.sqrt(), epsilon = 1e-12);

    // The default angle of pi/2 makes the oblique form orthogonal.
    let oblique = distances(
        Distance::space_time(Metric::Euclidean, 0.5, SpaceTimeCombination::Oblique),
        &focus,
        &reference,
    );
    assert_relative_eq!(oblique[0], orthogonal[0], epsilon = 1e-12);

    let angled = distances(
        Distance::space_time(Metric::Euclidean, 0.5, SpaceTimeCombination::Oblique)
            .with_angle(0.0),
        &focus,
        &reference,
    );
    // sqrt(12.5 + 2 + 2 * 0.5 * 5 * 2)
    assert_relative_eq!(angled[0], 24.5f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_space_time_requires_timestamps() {
    let loc = points(&[[0.0, 0.0], [1.0, 1.0]]);
    let mut sw = SpatialWeight::new(
        Distance::space_time(Metric::Euclidean, 0.5, SpaceTimeCombination::Orthogonal),
        BandwidthWeight::fixed(1.0, KernelFunction::Gaussian),
    );
    assert!(matches!(
        sw.bind(&loc, &loc),
        Err(GwrError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_precomputed_distance() {
    let loc = points(&[[0.0, 0.0], [1.0, 0.0]]);
    let matrix = Mat::from_fn(2, 2, |i, j| if i == j { 0.0 } else { 7.0 });
    let d = distances(Distance::precomputed(matrix), &loc, &loc);
    assert_eq!(d[0], 0.0);
    assert_eq!(d[1], 7.0);

    let mut sw = SpatialWeight::new(
        Distance::precomputed(Mat::zeros(3, 3)),
        BandwidthWeight::fixed(1.0, KernelFunction::Gaussian),
    );
    assert!(matches!(
        sw.bind(&loc, &loc),
        Err(GwrError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_max_distance() {
    let loc = common::grid_locations(4);
    let mut sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::fixed(1.0, KernelFunction::Gaussian),
    );
    sw.bind(&loc, &loc).expect("bind should succeed");
    assert_relative_eq!(sw.max_distance().unwrap(), 18f64.sqrt(), epsilon = 1e-12);
}

// ============================================================================
// Spatial Weights
// ============================================================================

#[test]
fn test_adaptive_bisquare_weights() {
    let loc = points(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [3.0, 0.0]]);
    let mut sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(3, KernelFunction::Bisquare),
    );
    sw.bind(&loc, &loc).expect("bind should succeed");
    let w = sw.weight_vector(0).unwrap();
    // The third nearest point (self included) sits at distance 2.
    assert_eq!(w[0], 1.0);
    assert_relative_eq!(w[1], 0.5625, epsilon = 1e-12);
    assert_eq!(w[2], 0.0);
    assert_eq!(w[3], 0.0);
}

#[test]
fn test_fixed_gaussian_weights() {
    let loc = points(&[[0.0, 0.0], [2.0, 0.0]]);
    let mut sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::fixed(2.0, KernelFunction::Gaussian),
    );
    sw.bind(&loc, &loc).expect("bind should succeed");
    let w = sw.weight_vector(1).unwrap();
    assert_relative_eq!(w[0], (-0.5f64).exp(), epsilon = 1e-12);
    assert_eq!(w[1], 1.0);
}

#[test]
fn test_unbound_weight_fails() {
    let sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::fixed(2.0, KernelFunction::Gaussian),
    );
    assert!(matches!(
        sw.weight_vector(0),
        Err(GwrError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_adaptive_bandwidth_above_n_fails() {
    let loc = points(&[[0.0, 0.0], [1.0, 0.0]]);
    let mut sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(5, KernelFunction::Bisquare),
    );
    assert!(matches!(
        sw.bind(&loc, &loc),
        Err(GwrError::InvalidConfiguration(_))
    ));
}

#[test]
fn test_rebind_focus() {
    let training = common::grid_locations(3);
    let targets = points(&[[0.5, 0.5], [1.5, 1.5]]);
    let mut sw = SpatialWeight::new(
        Distance::euclidean(),
        BandwidthWeight::adaptive(4, KernelFunction::Gaussian),
    );
    sw.bind(&training, &training).expect("bind should succeed");

    let rebound = sw.rebind_focus(&targets, &training).unwrap();
    assert_eq!(rebound.n_focus(), 2);
    assert_eq!(rebound.n_reference(), 9);
    assert_eq!(rebound.weight_vector(0).unwrap().nrows(), 9);
    assert_eq!(sw.n_focus(), 9);
}
