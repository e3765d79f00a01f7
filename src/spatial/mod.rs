//! Spatial weighting: locations, distances, kernels and their composition.
//!
//! A [`SpatialWeight`] combines a [`Distance`] with a [`BandwidthWeight`] and
//! the locations it is bound to, and yields the weight vector of any focus
//! location:
//!
//! ```rust,ignore
//! use gwr_rs::spatial::{BandwidthWeight, Distance, KernelFunction, Locations, SpatialWeight};
//!
//! let locations = Locations::new(coords);
//! let mut sw = SpatialWeight::new(
//!     Distance::euclidean(),
//!     BandwidthWeight::adaptive(36, KernelFunction::Gaussian),
//! );
//! sw.bind(&locations, &locations)?;
//! let w = sw.weight_vector(0)?;
//! ```

mod distance;
mod kernel;
mod locations;
mod weight;

pub use distance::{Distance, DistanceParameter, Metric, SpaceTimeCombination};
pub use kernel::{BandwidthWeight, KernelFunction};
pub use locations::Locations;
pub use weight::SpatialWeight;
