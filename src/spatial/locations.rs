//! Observation and prediction locations.

use faer::{Col, Mat};

/// A set of locations: coordinates (one row per location) and optional
/// timestamps for space-time distances.
#[derive(Debug, Clone)]
pub struct Locations {
    coords: Mat<f64>,
    times: Option<Col<f64>>,
}

impl Locations {
    /// Create a location set from an `n x d` coordinate matrix.
    pub fn new(coords: Mat<f64>) -> Self {
        Self {
            coords,
            times: None,
        }
    }

    /// Attach one timestamp per location.
    pub fn with_times(mut self, times: Col<f64>) -> Self {
        self.times = Some(times);
        self
    }

    /// Number of locations.
    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.nrows() == 0
    }

    /// Number of coordinate dimensions.
    pub fn dims(&self) -> usize {
        self.coords.ncols()
    }

    pub fn coords(&self) -> &Mat<f64> {
        &self.coords
    }

    pub fn times(&self) -> Option<&Col<f64>> {
        self.times.as_ref()
    }

    /// Coordinates flattened row by row.
    pub(crate) fn row_major(&self) -> Vec<f64> {
        let d = self.dims();
        let mut out = Vec::with_capacity(self.len() * d);
        for i in 0..self.len() {
            for j in 0..d {
                out.push(self.coords[(i, j)]);
            }
        }
        out
    }
}

impl From<Mat<f64>> for Locations {
    fn from(coords: Mat<f64>) -> Self {
        Self::new(coords)
    }
}
