//! Derivative-free Nelder–Mead minimization.
//!
//! Used to calibrate the two parameters of the scalable GWR model. Infinite
//! loss values mark rejected points; they are never selected as the best
//! vertex unless every vertex is infinite.

use crate::solvers::{FitStage, GwrError};

/// Outcome of a simplex minimization.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexResult {
    /// Best point found.
    pub point: Vec<f64>,
    /// Loss at `point`.
    pub value: f64,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the simplex size fell below the tolerance.
    pub converged: bool,
}

/// Nelder–Mead simplex minimizer.
#[derive(Debug, Clone)]
pub struct NelderMead {
    /// Initial step along every axis.
    pub step: f64,
    /// Stop once the mean vertex distance to the centroid falls below this.
    pub size_tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            step: 0.01,
            size_tolerance: 1e-6,
            max_iterations: 500,
        }
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

fn affine(a: &[f64], b: &[f64], t: f64) -> Vec<f64> {
    // a + t (b - a)
    a.iter().zip(b).map(|(&ai, &bi)| ai + t * (bi - ai)).collect()
}

fn simplex_size(vertices: &[Vec<f64>]) -> f64 {
    let m = vertices.len() as f64;
    let dim = vertices[0].len();
    let centroid: Vec<f64> = (0..dim)
        .map(|d| vertices.iter().map(|v| v[d]).sum::<f64>() / m)
        .collect();
    vertices
        .iter()
        .map(|v| {
            v.iter()
                .zip(&centroid)
                .map(|(a, c)| (a - c).powi(2))
                .sum::<f64>()
                .sqrt()
        })
        .sum::<f64>()
        / m
}

impl NelderMead {
    pub fn new(step: f64, size_tolerance: f64, max_iterations: usize) -> Self {
        Self {
            step,
            size_tolerance,
            max_iterations,
        }
    }

    /// Minimize `loss` starting from `start`.
    ///
    /// Non-finite loss values are treated as `+inf`. An `Err` from `loss`
    /// aborts the minimization. Fails with `OptimizationFailed` when no vertex
    /// ever has a finite loss.
    pub fn minimize<F>(&self, start: &[f64], mut loss: F) -> Result<SimplexResult, GwrError>
    where
        F: FnMut(&[f64]) -> Result<f64, GwrError>,
    {
        let dim = start.len();
        if dim == 0 {
            return Err(GwrError::config("simplex needs at least one parameter"));
        }

        let mut eval = |point: &[f64]| -> Result<f64, GwrError> {
            let value = loss(point)?;
            Ok(if value.is_finite() { value } else { f64::INFINITY })
        };

        let mut vertices: Vec<Vec<f64>> = Vec::with_capacity(dim + 1);
        vertices.push(start.to_vec());
        for d in 0..dim {
            let mut v = start.to_vec();
            v[d] += self.step;
            vertices.push(v);
        }
        let mut values = vertices
            .iter()
            .map(|v| eval(v))
            .collect::<Result<Vec<f64>, GwrError>>()?;

        let mut iterations = 0;
        let mut converged = false;
        while iterations < self.max_iterations {
            // Order vertices by loss.
            let mut order: Vec<usize> = (0..=dim).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            vertices = order.iter().map(|&i| vertices[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            if simplex_size(&vertices) < self.size_tolerance {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..dim)
                .map(|d| vertices[..dim].iter().map(|v| v[d]).sum::<f64>() / dim as f64)
                .collect();
            let worst = &vertices[dim];

            let reflected = affine(&centroid, worst, -REFLECTION);
            let f_reflected = eval(&reflected)?;

            if f_reflected < values[0] {
                let expanded = affine(&centroid, worst, -EXPANSION);
                let f_expanded = eval(&expanded)?;
                if f_expanded < f_reflected {
                    vertices[dim] = expanded;
                    values[dim] = f_expanded;
                } else {
                    vertices[dim] = reflected;
                    values[dim] = f_reflected;
                }
            } else if f_reflected < values[dim - 1] {
                vertices[dim] = reflected;
                values[dim] = f_reflected;
            } else {
                let (contracted, f_contracted) = if f_reflected < values[dim] {
                    let outside = affine(&centroid, &reflected, CONTRACTION);
                    let f = eval(&outside)?;
                    (outside, f)
                } else {
                    let inside = affine(&centroid, worst, CONTRACTION);
                    let f = eval(&inside)?;
                    (inside, f)
                };
                if f_contracted < values[dim].min(f_reflected) {
                    vertices[dim] = contracted;
                    values[dim] = f_contracted;
                } else {
                    let best = vertices[0].clone();
                    for i in 1..=dim {
                        vertices[i] = affine(&best, &vertices[i], SHRINK);
                        values[i] = eval(&vertices[i])?;
                    }
                }
            }
        }

        let (best, value) = vertices
            .iter()
            .zip(&values)
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(v, &f)| (v.clone(), f))
            .ok_or_else(|| GwrError::config("empty simplex"))?;

        if !value.is_finite() {
            return Err(GwrError::OptimizationFailed {
                stage: FitStage::ScaleCalibration,
                reason: "no finite loss at any simplex vertex".to_string(),
            });
        }

        log::debug!("simplex finished after {iterations} iterations at {best:?} (loss {value})");
        Ok(SimplexResult {
            point: best,
            value,
            iterations,
            converged,
        })
    }
}
