//! Serial and parallel execution of the per-location loop.
//!
//! Every location is an independent unit of work that reads shared inputs.
//! Parallel runs split `0..n` into one contiguous chunk per worker, fold each
//! chunk into its own accumulator and reduce the accumulators on the calling
//! thread in chunk order. Summation order is therefore fixed for a given
//! thread count; results across thread counts agree only up to rounding.
//!
//! A unit that fails raises a shared flag so the other workers stop early.
//! The first error in chunk order is returned once the region has completed.

use super::options::ParallelStrategy;
use crate::solvers::GwrError;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A resolved [`ParallelStrategy`].
#[derive(Clone, Default)]
pub struct Executor {
    strategy: ParallelStrategy,
    pool: Option<Arc<ThreadPool>>,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("strategy", &self.strategy)
            .field("workers", &self.workers())
            .finish()
    }
}

impl Executor {
    /// Resolve a strategy, building the thread pool for parallel runs.
    pub fn new(strategy: ParallelStrategy) -> Result<Self, GwrError> {
        let pool = match strategy {
            ParallelStrategy::Serial => None,
            ParallelStrategy::Parallel { threads } => {
                let pool = ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| GwrError::config(format!("cannot build thread pool: {e}")))?;
                Some(Arc::new(pool))
            }
        };
        Ok(Self { strategy, pool })
    }

    /// An executor that runs everything on the calling thread.
    pub fn serial() -> Self {
        Self::default()
    }

    /// The strategy this executor was resolved from.
    pub fn strategy(&self) -> ParallelStrategy {
        self.strategy
    }

    /// Number of workers used for the per-location loop.
    pub fn workers(&self) -> usize {
        self.pool
            .as_ref()
            .map_or(1, |pool| pool.current_num_threads().max(1))
    }

    /// Fold `0..n` into an accumulator.
    ///
    /// `fold` updates a worker-local accumulator for one location; `reduce`
    /// merges two accumulators, the left one covering earlier locations.
    pub fn fold<A, I, F, R>(&self, n: usize, init: I, fold: F, reduce: R) -> Result<A, GwrError>
    where
        A: Send,
        I: Fn() -> A + Sync,
        F: Fn(&mut A, usize) -> Result<(), GwrError> + Sync,
        R: Fn(A, A) -> A,
    {
        let Some(pool) = &self.pool else {
            let mut acc = init();
            for i in 0..n {
                fold(&mut acc, i)?;
            }
            return Ok(acc);
        };

        let failed = AtomicBool::new(false);
        let chunks = chunk_ranges(n, pool.current_num_threads().max(1));
        let partials: Vec<Result<A, GwrError>> = pool.install(|| {
            chunks
                .into_par_iter()
                .map(|range| {
                    let mut acc = init();
                    for i in range {
                        if failed.load(Ordering::Relaxed) {
                            break;
                        }
                        if let Err(e) = fold(&mut acc, i) {
                            failed.store(true, Ordering::Relaxed);
                            return Err(e);
                        }
                    }
                    Ok(acc)
                })
                .collect()
        });

        let mut merged: Option<A> = None;
        let mut first_error: Option<GwrError> = None;
        for partial in partials {
            match partial {
                Ok(acc) => {
                    merged = Some(match merged {
                        Some(prev) => reduce(prev, acc),
                        None => acc,
                    });
                }
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(merged.unwrap_or_else(init)),
        }
    }

    /// Evaluate `f` at every location, keeping results in location order.
    pub fn map<T, F>(&self, n: usize, f: F) -> Result<Vec<T>, GwrError>
    where
        T: Send,
        F: Fn(usize) -> Result<T, GwrError> + Sync,
    {
        self.fold(
            n,
            Vec::new,
            |acc: &mut Vec<T>, i| {
                acc.push(f(i)?);
                Ok(())
            },
            |mut left, right| {
                left.extend(right);
                left
            },
        )
    }
}

/// Split `0..n` into at most `parts` contiguous, non-empty ranges.
fn chunk_ranges(n: usize, parts: usize) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    let parts = parts.clamp(1, n);
    let base = n / parts;
    let extra = n % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for k in 0..parts {
        let len = base + usize::from(k < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
