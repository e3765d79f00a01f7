//! Distance providers.
//!
//! ## Purpose
//!
//! Computes the distances between one focus location and every reference
//! location. The kernel turns these into weights.
//!
//! ## Design notes
//!
//! * The set of distances is closed: [`Distance`] is an enum dispatched by
//!   `match` in the per-location loop.
//! * A [`DistanceParameter`] pairs focus and reference locations. Fitting binds
//!   the observations to themselves; prediction binds new focus locations to
//!   the observations.
//!
//! ## Invariants
//!
//! * Distances are non-negative.
//! * `distances(param, i)` has one entry per reference location.
//! * Parameters are validated once when bound, not per call.

use super::locations::Locations;
use crate::solvers::GwrError;
use faer::{Col, Mat};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

/// WGS84 equatorial radius in kilometres.
const WGS84_RADIUS_KM: f64 = 6378.137;
/// WGS84 flattening.
const WGS84_FLATTENING: f64 = 1.0 / 298.257223563;

// ============================================================================
// Point Metrics
// ============================================================================

/// Distance between two coordinate vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    /// Planar distance `sqrt(sum (a_k - b_k)^2)`.
    Euclidean,
    /// Great-circle distance in kilometres between (longitude, latitude)
    /// pairs given in degrees, on the WGS84 ellipsoid.
    GreatCircle,
    /// Lp norm of the coordinate difference rotated by `theta` radians.
    Minkowski { power: f64, theta: f64 },
}

impl Metric {
    /// Distance between two points.
    #[inline]
    pub fn between(&self, a: &[f64], b: &[f64]) -> f64 {
        match *self {
            Metric::Euclidean => euclidean(a, b),
            Metric::GreatCircle => great_circle(a[0], a[1], b[0], b[1]),
            Metric::Minkowski { power, theta } => minkowski(a, b, power, theta),
        }
    }

    fn validate(&self, dims: usize) -> Result<(), GwrError> {
        match *self {
            Metric::Euclidean => Ok(()),
            Metric::GreatCircle if dims != 2 => Err(GwrError::config(format!(
                "great-circle distance needs (longitude, latitude) coordinates, got {dims} columns"
            ))),
            Metric::GreatCircle => Ok(()),
            Metric::Minkowski { power, theta } => {
                if power.is_nan() || power <= 0.0 {
                    return Err(GwrError::config(format!(
                        "Minkowski power must be positive, got {power}"
                    )));
                }
                if !theta.is_finite() {
                    return Err(GwrError::config("Minkowski rotation must be finite"));
                }
                if theta != 0.0 && dims != 2 {
                    return Err(GwrError::config(format!(
                        "rotated Minkowski distance needs 2-D coordinates, got {dims} columns"
                    )));
                }
                Ok(())
            }
        }
    }
}

#[inline]
fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&ai, &bi)| (ai - bi) * (ai - bi))
        .sum::<f64>()
        .sqrt()
}

#[inline]
fn minkowski(a: &[f64], b: &[f64], power: f64, theta: f64) -> f64 {
    let mut diffs: Vec<f64> = a.iter().zip(b.iter()).map(|(&ai, &bi)| ai - bi).collect();
    if theta != 0.0 {
        let (sin, cos) = theta.sin_cos();
        let (dx, dy) = (diffs[0], diffs[1]);
        diffs[0] = dx * cos - dy * sin;
        diffs[1] = dx * sin + dy * cos;
    }

    if power.is_infinite() {
        diffs.iter().map(|d| d.abs()).fold(0.0, f64::max)
    } else if power == 1.0 {
        diffs.iter().map(|d| d.abs()).sum()
    } else if power == 2.0 {
        diffs.iter().map(|d| d * d).sum::<f64>().sqrt()
    } else {
        diffs
            .iter()
            .map(|d| d.abs().powf(power))
            .sum::<f64>()
            .powf(1.0 / power)
    }
}

/// Great-circle distance on the WGS84 ellipsoid (Lambert's formula).
fn great_circle(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    if lon1 == lon2 && lat1 == lat2 {
        return 0.0;
    }
    let rad = PI / 180.0;

    let f = (lat1 + lat2) / 2.0 * rad;
    let g = (lat1 - lat2) / 2.0 * rad;
    let l = (lon1 - lon2) / 2.0 * rad;

    let (sin_g, cos_g) = g.sin_cos();
    let (sin_f, cos_f) = f.sin_cos();
    let (sin_l, cos_l) = l.sin_cos();
    let (sin_g2, cos_g2) = (sin_g * sin_g, cos_g * cos_g);
    let (sin_f2, cos_f2) = (sin_f * sin_f, cos_f * cos_f);
    let (sin_l2, cos_l2) = (sin_l * sin_l, cos_l * cos_l);

    let s = sin_g2 * cos_l2 + cos_f2 * sin_l2;
    let c = cos_g2 * cos_l2 + sin_f2 * sin_l2;
    let w = (s / c).sqrt().atan();
    if w == 0.0 {
        return 0.0;
    }
    let r = (s * c).sqrt() / w;
    let d = 2.0 * w * WGS84_RADIUS_KM;
    let h1 = (3.0 * r - 1.0) / (2.0 * c);
    let h2 = (3.0 * r + 1.0) / (2.0 * s);

    d * (1.0 + WGS84_FLATTENING * h1 * sin_f2 * cos_g2 - WGS84_FLATTENING * h2 * cos_f2 * sin_g2)
}

// ============================================================================
// Distance Providers
// ============================================================================

/// How spatial and temporal distances are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpaceTimeCombination {
    /// `sqrt(l ds^2 + (1 - l) dt^2)`.
    #[default]
    Orthogonal,
    /// `sqrt(l ds^2 + (1 - l) dt^2 + 2 sqrt(l (1 - l)) ds dt cos(angle))`.
    Oblique,
}

/// A distance provider.
#[derive(Debug, Clone)]
pub enum Distance {
    /// Coordinate reference system distance: planar Euclidean, or great-circle
    /// when `geographic` is set.
    Crs { geographic: bool },
    /// Rotated Minkowski distance.
    Minkowski { power: f64, theta: f64 },
    /// Spatial distance combined with the absolute time difference.
    SpaceTime {
        spatial: Metric,
        lambda: f64,
        angle: f64,
        combination: SpaceTimeCombination,
    },
    /// A precomputed matrix, one row per focus and one column per reference.
    Precomputed(Arc<Mat<f64>>),
}

impl Default for Distance {
    fn default() -> Self {
        Distance::Crs { geographic: false }
    }
}

impl Distance {
    /// Planar Euclidean distance.
    pub fn euclidean() -> Self {
        Distance::Crs { geographic: false }
    }

    /// Great-circle distance between (longitude, latitude) points.
    pub fn great_circle() -> Self {
        Distance::Crs { geographic: true }
    }

    /// Minkowski distance with power `power` after rotating by `theta`.
    pub fn minkowski(power: f64, theta: f64) -> Self {
        Distance::Minkowski { power, theta }
    }

    /// Space-time distance with the default angle of pi/2.
    pub fn space_time(spatial: Metric, lambda: f64, combination: SpaceTimeCombination) -> Self {
        Distance::SpaceTime {
            spatial,
            lambda,
            angle: FRAC_PI_2,
            combination,
        }
    }

    /// Wrap a precomputed distance matrix.
    pub fn precomputed(matrix: Mat<f64>) -> Self {
        Distance::Precomputed(Arc::new(matrix))
    }

    /// Set the mixing angle of a space-time distance. No-op otherwise.
    pub fn with_angle(mut self, value: f64) -> Self {
        if let Distance::SpaceTime { angle, .. } = &mut self {
            *angle = value;
        }
        self
    }

    fn spatial_metric(&self) -> Option<Metric> {
        match *self {
            Distance::Crs { geographic: false } => Some(Metric::Euclidean),
            Distance::Crs { geographic: true } => Some(Metric::GreatCircle),
            Distance::Minkowski { power, theta } => Some(Metric::Minkowski { power, theta }),
            Distance::SpaceTime { spatial, .. } => Some(spatial),
            Distance::Precomputed(_) => None,
        }
    }

    /// Check that this distance can be evaluated on `param`.
    pub fn validate(&self, param: &DistanceParameter) -> Result<(), GwrError> {
        if let Some(metric) = self.spatial_metric() {
            metric.validate(param.dims)?;
        }
        match self {
            Distance::SpaceTime { lambda, angle, .. } => {
                if !(0.0..=1.0).contains(lambda) {
                    return Err(GwrError::config(format!(
                        "space-time lambda must be in [0, 1], got {lambda}"
                    )));
                }
                if !angle.is_finite() {
                    return Err(GwrError::config("space-time angle must be finite"));
                }
                if param.focus_times.is_none() || param.reference_times.is_none() {
                    return Err(GwrError::config(
                        "space-time distance needs timestamps on every location set",
                    ));
                }
            }
            Distance::Precomputed(matrix) => {
                if matrix.nrows() != param.n_focus || matrix.ncols() != param.n_reference {
                    return Err(GwrError::config(format!(
                        "precomputed distance matrix is {}x{}, expected {}x{}",
                        matrix.nrows(),
                        matrix.ncols(),
                        param.n_focus,
                        param.n_reference
                    )));
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Distances from focus location `focus` to every reference location.
    ///
    /// `param` must have been checked with [`Distance::validate`].
    pub fn distances(&self, param: &DistanceParameter, focus: usize) -> Col<f64> {
        let n = param.n_reference;
        match self {
            Distance::Precomputed(matrix) => Col::from_fn(n, |j| matrix[(focus, j)]),
            Distance::SpaceTime {
                spatial,
                lambda,
                angle,
                combination,
            } => {
                let a = param.focus_point(focus);
                let (Some(tf), Some(tr)) = (&param.focus_times, &param.reference_times) else {
                    return Col::from_fn(n, |_| f64::NAN);
                };
                let t = tf[focus];
                let mix = 2.0 * (lambda * (1.0 - lambda)).sqrt() * angle.cos();
                Col::from_fn(n, |j| {
                    let ds = spatial.between(a, param.reference_point(j));
                    let dt = (t - tr[j]).abs();
                    let sq = lambda * ds * ds + (1.0 - lambda) * dt * dt;
                    match combination {
                        SpaceTimeCombination::Orthogonal => sq.sqrt(),
                        SpaceTimeCombination::Oblique => (sq + mix * ds * dt).max(0.0).sqrt(),
                    }
                })
            }
            _ => {
                let metric = self.spatial_metric().unwrap_or(Metric::Euclidean);
                let a = param.focus_point(focus);
                Col::from_fn(n, |j| metric.between(a, param.reference_point(j)))
            }
        }
    }

    /// The largest distance between any focus and any reference location.
    pub fn max_distance(&self, param: &DistanceParameter) -> f64 {
        (0..param.n_focus)
            .map(|i| self.distances(param, i).iter().copied().fold(0.0, f64::max))
            .fold(0.0, f64::max)
    }
}

// ============================================================================
// Distance Parameter
// ============================================================================

/// Focus and reference locations a distance is evaluated between.
#[derive(Debug, Clone)]
pub struct DistanceParameter {
    focus: Vec<f64>,
    reference: Vec<f64>,
    focus_times: Option<Vec<f64>>,
    reference_times: Option<Vec<f64>>,
    dims: usize,
    n_focus: usize,
    n_reference: usize,
}

impl DistanceParameter {
    /// Pair `focus` locations with `reference` locations.
    pub fn new(focus: &Locations, reference: &Locations) -> Result<Self, GwrError> {
        if focus.dims() != reference.dims() {
            return Err(GwrError::config(format!(
                "focus locations have {} coordinate columns, reference locations have {}",
                focus.dims(),
                reference.dims()
            )));
        }
        if reference.is_empty() {
            return Err(GwrError::config("reference location set is empty"));
        }
        let times = |locations: &Locations| -> Result<Option<Vec<f64>>, GwrError> {
            match locations.times() {
                Some(t) if t.nrows() != locations.len() => Err(GwrError::LocationMismatch {
                    expected: locations.len(),
                    got: t.nrows(),
                }),
                Some(t) => Ok(Some(t.iter().copied().collect())),
                None => Ok(None),
            }
        };

        Ok(Self {
            focus: focus.row_major(),
            reference: reference.row_major(),
            focus_times: times(focus)?,
            reference_times: times(reference)?,
            dims: focus.dims(),
            n_focus: focus.len(),
            n_reference: reference.len(),
        })
    }

    /// Number of focus locations.
    pub fn n_focus(&self) -> usize {
        self.n_focus
    }

    /// Number of reference locations.
    pub fn n_reference(&self) -> usize {
        self.n_reference
    }

    #[inline]
    fn focus_point(&self, i: usize) -> &[f64] {
        &self.focus[i * self.dims..(i + 1) * self.dims]
    }

    #[inline]
    fn reference_point(&self, j: usize) -> &[f64] {
        &self.reference[j * self.dims..(j + 1) * self.dims]
    }
}
