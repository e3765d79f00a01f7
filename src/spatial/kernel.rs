//! Kernel functions and bandwidth weights.

use crate::solvers::GwrError;
use faer::Col;

/// Kernel applied to the scaled distance `u = d / bandwidth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelFunction {
    /// `exp(-u^2 / 2)`
    #[default]
    Gaussian,
    /// `exp(-u)`
    Exponential,
    /// `(1 - u^2)^2` for `u < 1`
    Bisquare,
    /// `(1 - u^3)^3` for `u < 1`
    Tricube,
    /// `1` for `u < 1`
    Boxcar,
}

impl KernelFunction {
    /// Weight at distance `distance` for a (fixed) bandwidth.
    #[inline]
    pub fn evaluate(self, distance: f64, bandwidth: f64) -> f64 {
        let u = if distance == 0.0 {
            0.0
        } else {
            distance / bandwidth
        };
        match self {
            KernelFunction::Gaussian => gaussian(u),
            KernelFunction::Exponential => exponential(u),
            KernelFunction::Bisquare => bisquare(u),
            KernelFunction::Tricube => tricube(u),
            KernelFunction::Boxcar => boxcar(u),
        }
    }

    /// Whether the kernel is zero beyond the bandwidth.
    pub fn is_bounded(self) -> bool {
        matches!(
            self,
            KernelFunction::Bisquare | KernelFunction::Tricube | KernelFunction::Boxcar
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            KernelFunction::Gaussian => "gaussian",
            KernelFunction::Exponential => "exponential",
            KernelFunction::Bisquare => "bisquare",
            KernelFunction::Tricube => "tricube",
            KernelFunction::Boxcar => "boxcar",
        }
    }
}

#[inline]
fn gaussian(u: f64) -> f64 {
    (-0.5 * u * u).exp()
}

#[inline]
fn exponential(u: f64) -> f64 {
    (-u).exp()
}

#[inline]
fn bisquare(u: f64) -> f64 {
    if u < 1.0 {
        let t = 1.0 - u * u;
        t * t
    } else {
        0.0
    }
}

#[inline]
fn tricube(u: f64) -> f64 {
    if u < 1.0 {
        let t = 1.0 - u * u * u;
        t * t * t
    } else {
        0.0
    }
}

#[inline]
fn boxcar(u: f64) -> f64 {
    if u < 1.0 {
        1.0
    } else {
        0.0
    }
}

/// A bandwidth and the kernel it is applied with.
///
/// An adaptive bandwidth counts nearest neighbours: the effective distance
/// bandwidth at a focus location is its distance to the k-th nearest
/// reference location. A fixed bandwidth is a distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandwidthWeight {
    pub bandwidth: f64,
    pub adaptive: bool,
    pub kernel: KernelFunction,
}

impl BandwidthWeight {
    pub fn new(bandwidth: f64, adaptive: bool, kernel: KernelFunction) -> Self {
        Self {
            bandwidth,
            adaptive,
            kernel,
        }
    }

    /// A fixed-distance bandwidth.
    pub fn fixed(bandwidth: f64, kernel: KernelFunction) -> Self {
        Self::new(bandwidth, false, kernel)
    }

    /// An adaptive bandwidth of `neighbours` nearest neighbours.
    pub fn adaptive(neighbours: usize, kernel: KernelFunction) -> Self {
        Self::new(neighbours as f64, true, kernel)
    }

    /// The same kernel and mode with another bandwidth value.
    pub fn with_bandwidth(&self, bandwidth: f64) -> Self {
        Self { bandwidth, ..*self }
    }

    /// Distance bandwidth to use for one distance vector.
    pub fn effective_bandwidth(&self, distances: &Col<f64>) -> Result<f64, GwrError> {
        let n = distances.nrows();
        if self.bandwidth.is_nan() {
            return Err(GwrError::config("bandwidth is NaN"));
        }
        if !self.adaptive {
            if self.bandwidth <= 0.0 {
                return Err(GwrError::config(format!(
                    "fixed bandwidth must be positive, got {}",
                    self.bandwidth
                )));
            }
            return Ok(self.bandwidth);
        }

        if self.bandwidth < 1.0 {
            return Err(GwrError::config(format!(
                "adaptive bandwidth must count at least one neighbour, got {}",
                self.bandwidth
            )));
        }
        if self.bandwidth > n as f64 {
            return Err(GwrError::config(format!(
                "adaptive bandwidth {} exceeds the number of locations {n}",
                self.bandwidth
            )));
        }
        let k = self.bandwidth as usize;
        let mut sorted: Vec<f64> = distances.iter().copied().collect();
        let (_, kth, _) = sorted.select_nth_unstable_by(k - 1, |a, b| a.total_cmp(b));
        Ok(*kth)
    }

    /// Kernel weights for a distance vector.
    pub fn weights(&self, distances: &Col<f64>) -> Result<Col<f64>, GwrError> {
        let bw = self.effective_bandwidth(distances)?;
        let kernel = self.kernel;
        Ok(Col::from_fn(distances.nrows(), |j| kernel.evaluate(distances[j], bw)))
    }
}
