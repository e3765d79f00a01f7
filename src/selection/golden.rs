//! One-dimensional golden-section bandwidth search.

use crate::solvers::{FitStage, GwrError};

/// The golden ratio conjugate, `(sqrt(5) - 1) / 2`.
const R: f64 = 0.618_033_988_749_894_9;

/// Golden-section search over a bandwidth interval.
///
/// Adaptive bandwidths are neighbour counts, so probe points are rounded to
/// integers. Every finite criterion value is recorded and available through
/// [`criterion_list`](Self::criterion_list), sorted by bandwidth.
#[derive(Debug, Clone)]
pub struct GoldenSectionSelector {
    lower: f64,
    upper: f64,
    eps: f64,
    max_iterations: usize,
    evaluated: Vec<(f64, f64)>,
}

impl GoldenSectionSelector {
    /// A selector over `[lower, upper]` with `eps = 1e-4` and 100 iterations.
    pub fn new(lower: f64, upper: f64) -> Self {
        Self {
            lower,
            upper,
            eps: 1e-4,
            max_iterations: 100,
            evaluated: Vec::new(),
        }
    }

    pub fn with_eps(mut self, eps: f64) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    fn record(&mut self, bandwidth: f64, value: f64) {
        if !value.is_finite() {
            return;
        }
        match self.evaluated.iter_mut().find(|(b, _)| *b == bandwidth) {
            Some(entry) => entry.1 = value,
            None => self.evaluated.push((bandwidth, value)),
        }
    }

    /// Minimize `criterion` over the interval.
    ///
    /// `criterion` returns `+inf` for a rejected bandwidth; an `Err` aborts the
    /// search. Fails with `OptimizationFailed` when no evaluated bandwidth has a
    /// finite criterion.
    pub fn optimize<F>(&mut self, adaptive: bool, mut criterion: F) -> Result<f64, GwrError>
    where
        F: FnMut(f64) -> Result<f64, GwrError>,
    {
        if !(self.lower.is_finite() && self.upper.is_finite()) || self.lower > self.upper {
            return Err(GwrError::config(format!(
                "invalid bandwidth interval [{}, {}]",
                self.lower, self.upper
            )));
        }

        self.evaluated.clear();
        let mut eval = |bw: f64| -> Result<f64, GwrError> {
            let value = criterion(bw)?;
            let value = if value.is_finite() { value } else { f64::INFINITY };
            log::debug!("bandwidth {bw}: criterion {value}");
            Ok(value)
        };

        let (mut xl, mut xu) = (self.lower, self.upper);
        let mut d = R * (xu - xl);
        let mut x1 = if adaptive { (xl + d).floor() } else { xl + d };
        let mut x2 = if adaptive { (xu - d).round() } else { xu - d };
        let mut f1 = eval(x1)?;
        let mut f2 = eval(x2)?;
        self.record(x1, f1);
        self.record(x2, f2);

        let mut d1 = f2 - f1;
        let mut xopt = if f1 < f2 { x1 } else { x2 };
        let mut iter = 0;

        // NaN differences (both sides infinite) end the loop.
        while d.abs() > self.eps && d1.abs() > self.eps && iter < self.max_iterations {
            d *= R;
            if f1 < f2 {
                xl = x2;
                x2 = x1;
                x1 = if adaptive { (xl + d).round() } else { xl + d };
                f2 = f1;
                f1 = eval(x1)?;
                self.record(x1, f1);
            } else {
                xu = x1;
                x1 = x2;
                x2 = if adaptive { (xu - d).floor() } else { xu - d };
                f1 = f2;
                f2 = eval(x2)?;
                self.record(x2, f2);
            }
            iter += 1;
            xopt = if f1 < f2 { x1 } else { x2 };
            d1 = f2 - f1;
        }

        if !f1.is_finite() && !f2.is_finite() {
            // Fall back to the best finite evaluation.
            let best = self
                .evaluated
                .iter()
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map(|&(bw, _)| bw);
            return best.ok_or_else(|| GwrError::OptimizationFailed {
                stage: FitStage::BandwidthSearch,
                reason: format!(
                    "no finite criterion in [{}, {}]",
                    self.lower, self.upper
                ),
            });
        }

        log::info!("golden-section search selected bandwidth {xopt} after {iter} iterations");
        Ok(xopt)
    }

    /// Evaluated `(bandwidth, criterion)` pairs sorted by bandwidth.
    pub fn criterion_list(&self) -> Vec<(f64, f64)> {
        let mut list = self.evaluated.clone();
        list.sort_by(|a, b| a.0.total_cmp(&b.0));
        list
    }
}
