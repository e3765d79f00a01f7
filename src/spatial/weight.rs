//! Spatial weights: a distance provider composed with a bandwidth weight.

use super::distance::{Distance, DistanceParameter};
use super::kernel::BandwidthWeight;
use super::locations::Locations;
use crate::solvers::GwrError;
use faer::Col;
use std::sync::Arc;

/// Produces the weight vector of every focus location.
///
/// The distance, the bandwidth and the bound locations must all be present
/// before weights can be computed.
#[derive(Debug, Clone, Default)]
pub struct SpatialWeight {
    distance: Option<Distance>,
    weight: Option<BandwidthWeight>,
    parameter: Option<Arc<DistanceParameter>>,
}

impl SpatialWeight {
    pub fn new(distance: Distance, weight: BandwidthWeight) -> Self {
        Self {
            distance: Some(distance),
            weight: Some(weight),
            parameter: None,
        }
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = Some(distance);
        self.parameter = None;
        self
    }

    pub fn with_weight(mut self, weight: BandwidthWeight) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn distance(&self) -> Option<&Distance> {
        self.distance.as_ref()
    }

    pub fn weight(&self) -> Option<&BandwidthWeight> {
        self.weight.as_ref()
    }

    /// The bandwidth weight, or `InvalidConfiguration` when none is assigned.
    pub fn bandwidth(&self) -> Result<&BandwidthWeight, GwrError> {
        self.weight
            .as_ref()
            .ok_or_else(|| GwrError::config("spatial weight has no kernel assigned"))
    }

    /// Replace the bandwidth value, keeping kernel and mode.
    pub fn set_bandwidth(&mut self, bandwidth: f64) -> Result<(), GwrError> {
        let weight = self
            .weight
            .as_mut()
            .ok_or_else(|| GwrError::config("spatial weight has no kernel assigned"))?;
        weight.bandwidth = bandwidth;
        Ok(())
    }

    /// Bind focus and reference locations and validate the configuration.
    pub fn bind(&mut self, focus: &Locations, reference: &Locations) -> Result<(), GwrError> {
        let param = DistanceParameter::new(focus, reference)?;
        self.bind_parameter(Arc::new(param))
    }

    /// Share an already-built parameter.
    pub(crate) fn bind_parameter(&mut self, param: Arc<DistanceParameter>) -> Result<(), GwrError> {
        let distance = self
            .distance
            .as_ref()
            .ok_or_else(|| GwrError::config("spatial weight has no distance assigned"))?;
        distance.validate(&param)?;
        self.parameter = Some(param);
        self.validate()
    }

    pub(crate) fn parameter(&self) -> Option<&Arc<DistanceParameter>> {
        self.parameter.as_ref()
    }

    /// A copy bound to new focus locations against the same reference set.
    pub fn rebind_focus(&self, focus: &Locations, reference: &Locations) -> Result<Self, GwrError> {
        let mut rebound = self.clone();
        rebound.bind(focus, reference)?;
        Ok(rebound)
    }

    /// Check that distance, kernel and locations are all present.
    pub fn validate(&self) -> Result<(), GwrError> {
        if self.distance.is_none() {
            return Err(GwrError::config("spatial weight has no distance assigned"));
        }
        let weight = self.bandwidth()?;
        let Some(param) = &self.parameter else {
            return Err(GwrError::config("spatial weight has no locations bound"));
        };
        if weight.adaptive && weight.bandwidth > param.n_reference() as f64 {
            return Err(GwrError::config(format!(
                "adaptive bandwidth {} exceeds the number of locations {}",
                weight.bandwidth,
                param.n_reference()
            )));
        }
        Ok(())
    }

    fn bound(&self) -> Result<(&Distance, &DistanceParameter), GwrError> {
        let distance = self
            .distance
            .as_ref()
            .ok_or_else(|| GwrError::config("spatial weight has no distance assigned"))?;
        let param = self
            .parameter
            .as_deref()
            .ok_or_else(|| GwrError::config("spatial weight has no locations bound"))?;
        Ok((distance, param))
    }

    /// Number of focus locations.
    pub fn n_focus(&self) -> usize {
        self.parameter.as_ref().map_or(0, |p| p.n_focus())
    }

    /// Number of reference locations.
    pub fn n_reference(&self) -> usize {
        self.parameter.as_ref().map_or(0, |p| p.n_reference())
    }

    /// Distances from focus location `focus` to every reference location.
    pub fn distance_vector(&self, focus: usize) -> Result<Col<f64>, GwrError> {
        let (distance, param) = self.bound()?;
        if focus >= param.n_focus() {
            return Err(GwrError::config(format!(
                "focus index {focus} out of range for {} locations",
                param.n_focus()
            )));
        }
        Ok(distance.distances(param, focus))
    }

    /// Weight vector of focus location `focus`.
    pub fn weight_vector(&self, focus: usize) -> Result<Col<f64>, GwrError> {
        let weight = *self.bandwidth()?;
        self.weight_vector_with(&weight, focus)
    }

    /// Weight vector of focus location `focus` under a candidate bandwidth.
    pub fn weight_vector_with(
        &self,
        weight: &BandwidthWeight,
        focus: usize,
    ) -> Result<Col<f64>, GwrError> {
        let distances = self.distance_vector(focus)?;
        weight.weights(&distances)
    }

    /// The largest focus-to-reference distance.
    pub fn max_distance(&self) -> Result<f64, GwrError> {
        let (distance, param) = self.bound()?;
        Ok(distance.max_distance(param))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::KernelFunction;
    use faer::Mat;

    fn line(n: usize) -> Locations {
        Locations::new(Mat::from_fn(n, 2, |i, j| if j == 0 { i as f64 } else { 0.0 }))
    }

    #[test]
    fn test_missing_distance_or_kernel() {
        let loc = line(5);

        let mut sw = SpatialWeight::default();
        assert!(matches!(sw.bind(&loc, &loc), Err(GwrError::InvalidConfiguration(_))));

        let mut sw = SpatialWeight::default().with_distance(Distance::euclidean());
        assert!(matches!(sw.bind(&loc, &loc), Err(GwrError::InvalidConfiguration(_))));

        let sw = SpatialWeight::default()
            .with_weight(BandwidthWeight::fixed(1.0, KernelFunction::Gaussian));
        assert!(sw.weight_vector(0).is_err());
    }

    #[test]
    fn test_unbound_weight_fails() {
        let sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::fixed(1.0, KernelFunction::Gaussian),
        );
        assert!(matches!(sw.validate(), Err(GwrError::InvalidConfiguration(_))));
        assert!(sw.weight_vector(0).is_err());
    }

    #[test]
    fn test_adaptive_bandwidth_larger_than_n_rejected() {
        let loc = line(5);
        let mut sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::adaptive(6, KernelFunction::Bisquare),
        );
        assert!(matches!(sw.bind(&loc, &loc), Err(GwrError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_weight_vector() {
        let loc = line(5);
        let mut sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::fixed(2.0, KernelFunction::Bisquare),
        );
        sw.bind(&loc, &loc).unwrap();

        let w = sw.weight_vector(2).unwrap();
        assert_eq!(w[2], 1.0);
        assert!((w[1] - 0.5625).abs() < 1e-15);
        assert!((w[3] - 0.5625).abs() < 1e-15);
        assert_eq!(w[0], 0.0);
        assert_eq!(w[4], 0.0);

        assert!(sw.weight_vector(5).is_err());
        assert_eq!(sw.max_distance().unwrap(), 4.0);
    }

    #[test]
    fn test_set_bandwidth_and_rebind() {
        let loc = line(6);
        let mut sw = SpatialWeight::new(
            Distance::euclidean(),
            BandwidthWeight::adaptive(3, KernelFunction::Gaussian),
        );
        sw.bind(&loc, &loc).unwrap();
        sw.set_bandwidth(4.0).unwrap();
        assert_eq!(sw.bandwidth().unwrap().bandwidth, 4.0);

        let targets = Locations::new(Mat::from_fn(2, 2, |i, _| i as f64 + 0.5));
        let rebound = sw.rebind_focus(&targets, &loc).unwrap();
        assert_eq!(rebound.n_focus(), 2);
        assert_eq!(rebound.n_reference(), 6);
        assert_eq!(rebound.weight_vector(1).unwrap().nrows(), 6);
    }
}
