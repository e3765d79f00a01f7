//! Common test utilities and spatial data generators.

#![allow(dead_code)]

use faer::{Col, Mat};
use gwr_rs::spatial::Locations;

/// Simple deterministic "random" source for reproducibility.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    /// Uniform draw in [-1, 1].
    pub fn next(&mut self) -> f64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1);
        ((self.0 >> 33) as f64) / (u32::MAX as f64) * 2.0 - 1.0
    }
}

/// A synthetic dataset with known local coefficients.
pub struct SpatialData {
    pub locations: Locations,
    pub x: Mat<f64>,
    pub y: Col<f64>,
    /// True coefficients, intercept first (n x 3).
    pub betas: Mat<f64>,
}

/// `side x side` grid with unit spacing.
pub fn grid_locations(side: usize) -> Locations {
    Locations::new(Mat::from_fn(side * side, 2, |i, j| {
        if j == 0 {
            (i % side) as f64
        } else {
            (i / side) as f64
        }
    }))
}

/// Two predictors on a grid with coefficients
/// `b0 = 1 + u / side`, `b1 = 2 + v / side`, `b2 = -1`.
pub fn generate_spatial_data(side: usize, noise_std: f64, seed: u64) -> SpatialData {
    let locations = grid_locations(side);
    let n = side * side;
    let mut rng = Lcg::new(seed);
    let s = side as f64;

    let coords = locations.coords();
    let betas = Mat::from_fn(n, 3, |i, j| match j {
        0 => 1.0 + coords[(i, 0)] / s,
        1 => 2.0 + coords[(i, 1)] / s,
        _ => -1.0,
    });

    let mut x = Mat::zeros(n, 2);
    let mut y = Col::zeros(n);
    for i in 0..n {
        x[(i, 0)] = rng.next();
        x[(i, 1)] = rng.next();
        y[i] = betas[(i, 0)]
            + betas[(i, 1)] * x[(i, 0)]
            + betas[(i, 2)] * x[(i, 1)]
            + noise_std * rng.next();
    }

    SpatialData {
        locations,
        x,
        y,
        betas,
    }
}

/// A global model `y = 1 + 2 x1 - x2` without noise.
pub fn generate_global_data(side: usize, seed: u64) -> SpatialData {
    let locations = grid_locations(side);
    let n = side * side;
    let mut rng = Lcg::new(seed);
    let x = Mat::from_fn(n, 2, |_, _| rng.next());
    let y = Col::from_fn(n, |i| 1.0 + 2.0 * x[(i, 0)] - x[(i, 1)]);
    let betas = Mat::from_fn(n, 3, |_, j| [1.0, 2.0, -1.0][j]);
    SpatialData {
        locations,
        x,
        y,
        betas,
    }
}

/// Largest absolute elementwise difference.
pub fn max_abs_diff(a: &Mat<f64>, b: &Mat<f64>) -> f64 {
    assert_eq!((a.nrows(), a.ncols()), (b.nrows(), b.ncols()));
    let mut max = 0.0_f64;
    for i in 0..a.nrows() {
        for j in 0..a.ncols() {
            max = max.max((a[(i, j)] - b[(i, j)]).abs());
        }
    }
    max
}

/// Trace of a square matrix.
pub fn trace(m: &Mat<f64>) -> f64 {
    (0..m.nrows()).map(|i| m[(i, i)]).sum()
}

/// Approximate equality check for floating point values.
pub fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
    (a - b).abs() < epsilon
}
