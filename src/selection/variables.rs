//! Forward selection of independent variables.
//!
//! Variables are added greedily, one per round, each time choosing the one
//! whose global OLS model has the lowest AICc. Every evaluated model is kept.

use crate::diagnostics::aicc_from_rss;
use crate::solvers::local::solve;
use crate::solvers::GwrError;
use crate::utils::build_design_matrix;
use faer::{Col, Mat};

/// One evaluated model: the variable indices (columns of the predictor
/// matrix, intercept excluded) and its AICc.
pub type VariableCriterion = (Vec<usize>, f64);

/// AICc of the global OLS model on the given predictor columns.
///
/// Numerical failures give `+inf`.
pub fn variables_criterion(
    x: &Mat<f64>,
    y: &Col<f64>,
    variables: &[usize],
    with_intercept: bool,
) -> f64 {
    let n = x.nrows();
    let sub = Mat::from_fn(n, variables.len(), |i, j| x[(i, variables[j])]);
    let design = build_design_matrix(&sub, with_intercept);
    let p = design.ncols();
    let w = Col::from_fn(n, |_| 1.0);
    let Ok(beta) = solve(&design, y, &w, 0) else {
        return f64::INFINITY;
    };
    let rss: f64 = (0..n)
        .map(|i| {
            let yhat: f64 = (0..p).map(|j| design[(i, j)] * beta[j]).sum();
            (y[i] - yhat).powi(2)
        })
        .sum();
    // OLS: tr(S) = tr(S'S) = p.
    let value = aicc_from_rss(rss, n, p as f64);
    if value.is_finite() {
        value
    } else {
        f64::INFINITY
    }
}

/// Greedy forward variable selector.
#[derive(Debug, Clone)]
pub struct VariableForwardSelector {
    threshold: f64,
    models: Vec<VariableCriterion>,
}

impl Default for VariableForwardSelector {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl VariableForwardSelector {
    /// A selector with the AICc improvement `threshold` (default 3.0).
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            models: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Run forward selection over `candidates`.
    ///
    /// `criterion` evaluates a variable set; a `+inf` value rejects it.
    pub fn optimize<F>(&mut self, candidates: &[usize], mut criterion: F) -> Result<Vec<usize>, GwrError>
    where
        F: FnMut(&[usize]) -> f64,
    {
        if candidates.is_empty() {
            return Err(GwrError::config("no candidate variables to select from"));
        }

        self.models.clear();
        let mut selected: Vec<usize> = Vec::new();
        let mut rest: Vec<usize> = candidates.to_vec();

        while !rest.is_empty() {
            let mut best: Option<(usize, f64)> = None;
            for (idx, &var) in rest.iter().enumerate() {
                let mut trial = selected.clone();
                trial.push(var);
                let value = criterion(&trial);
                log::debug!("variables {trial:?}: AICc {value}");
                self.models.push((trial, value));
                if best.map_or(true, |(_, b)| value < b) {
                    best = Some((idx, value));
                }
            }
            let Some((idx, _)) = best else { break };
            selected.push(rest.remove(idx));
        }

        self.models = Self::sort_models(std::mem::take(&mut self.models));
        let chosen = self.select();
        log::info!("forward selection chose variables {chosen:?}");
        Ok(chosen)
    }

    /// Group models by size (ascending) and sort each group by descending criterion.
    fn sort_models(mut models: Vec<VariableCriterion>) -> Vec<VariableCriterion> {
        models.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then(b.1.total_cmp(&a.1)));
        models
    }

    /// The last model whose criterion differs from its predecessor by at
    /// least the threshold; the last model when none does.
    fn select(&self) -> Vec<usize> {
        for i in (1..self.models.len()).rev() {
            if (self.models[i].1 - self.models[i - 1].1).abs() >= self.threshold {
                return self.models[i].0.clone();
            }
        }
        self.models.last().map(|m| m.0.clone()).unwrap_or_default()
    }

    /// Every evaluated model, grouped by size and sorted by descending AICc.
    pub fn criterion_list(&self) -> &[VariableCriterion] {
        &self.models
    }
}
