//! Monte Carlo Shapley estimation by permutation sampling.
//!
//! Each sampled permutation of the members is walked left to right; the marginal
//! contribution of every member at the moment it joins is one unbiased sample of its
//! Shapley value. Permutations are drawn in fixed-size batches (the parallel work unit)
//! and batches are grouped into rounds. Convergence is checked after each round:
//!
//! ```text
//! z · max_i SE_i ≤ tolerance · v(N)
//! ```
//!
//! # Determinism
//!
//! Batch `b` seeds its own [`Pcg64`] from `seed ^ mix(b)`, a round always contains the
//! same batches, and per-batch statistics are merged in batch order. The output for a
//! given seed is therefore identical for any number of workers.

use std::fmt;

use coalition_stats::{normal, running::RunningStats};
use rand::{SeedableRng as _, seq::SliceRandom as _};
use rand_pcg::Pcg64;

use crate::{
    cache::MemoCache,
    coalition::Coalition,
    coalition_evaluator::CoalitionEvaluator,
    error::{EngineError, Result},
    scheduler::{CancelToken, WorkerPool},
    value::CoalitionValue,
};

const SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Sampling budget and stopping rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPlan {
    pub seed: u64,
    pub batch_size: usize,
    pub round_batches: usize,
    pub min_iterations: usize,
    pub max_iterations: usize,
    /// Tolerance relative to `v(N)`.
    pub tolerance: f64,
    /// Normal quantile the standard error is scaled by.
    pub z: f64,
    pub strict: bool,
}

/// A contiguous range of permutations drawn from one seeded generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermutationBatch {
    index: usize,
    start: usize,
    count: usize,
}

impl fmt::Display for PermutationBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "permutation batch #{} (permutations {}..{})",
            self.index,
            self.start,
            self.start + self.count
        )
    }
}

impl PermutationBatch {
    fn rng(&self, seed: u64) -> Pcg64 {
        Pcg64::seed_from_u64(seed ^ (self.index as u64).wrapping_mul(SEED_MIX))
    }
}

/// Estimates and diagnostics of one sampling run.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproximateOutcome {
    pub values: Vec<f64>,
    pub standard_errors: Vec<Option<f64>>,
    pub samples: Vec<u64>,
    pub iterations: usize,
    pub converged: bool,
    pub max_standard_error: Option<f64>,
    pub achieved_confidence: f64,
}

/// Permutation-sampling solver, parallel across batches.
#[derive(Debug, Clone, Copy)]
pub struct ApproximateSolver {
    pool: WorkerPool,
    plan: SamplingPlan,
}

impl ApproximateSolver {
    #[must_use]
    pub fn new(pool: WorkerPool, plan: SamplingPlan) -> Self {
        Self { pool, plan }
    }

    /// Samples until convergence or the iteration budget, whichever comes first.
    ///
    /// `grand_value` is `v(N)`, the scale of the tolerance. When the budget runs out
    /// first the best estimate is returned, unless the plan is strict, in which case
    /// [`EngineError::ConvergenceTimeout`] is raised.
    pub fn solve(
        &self,
        n: usize,
        grand_value: f64,
        value_fn: &dyn CoalitionValue,
        cache: &MemoCache,
        token: &CancelToken,
    ) -> Result<ApproximateOutcome> {
        let plan = &self.plan;
        let tolerance = plan.tolerance * grand_value;
        let min_iterations = plan.min_iterations.min(plan.max_iterations);
        let batch_size = plan.batch_size.max(1);

        let mut stats = vec![RunningStats::new(); n];
        let mut iterations = 0;
        let mut next_batch = 0;
        let mut converged = false;
        let mut max_se = None;

        while iterations < plan.max_iterations {
            let mut batches = vec![];
            let mut start = iterations;
            while batches.len() < plan.round_batches.max(1) && start < plan.max_iterations {
                let count = batch_size.min(plan.max_iterations - start);
                batches.push(PermutationBatch {
                    index: next_batch,
                    start,
                    count,
                });
                next_batch += 1;
                start += count;
            }

            let partials = self.pool.run(&batches, token, |batch| {
                let evaluator = CoalitionEvaluator::new(value_fn, cache, token);
                sample_batch(&evaluator, n, batch, plan.seed)
            })?;
            for partial in &partials {
                for (total, part) in stats.iter_mut().zip(partial) {
                    total.merge(part);
                }
            }
            iterations = start;

            max_se = max_standard_error(&stats);
            tracing::debug!(
                iterations,
                max_standard_error = ?max_se,
                tolerance,
                "sampling round finished"
            );
            if iterations >= min_iterations
                && max_se.is_some_and(|se| plan.z * se <= tolerance)
            {
                converged = true;
                break;
            }
        }

        let achieved_confidence =
            max_se.map_or(0.0, |se| normal::two_sided_confidence(tolerance, se));
        if !converged {
            let max_standard_error = max_se.unwrap_or(f64::INFINITY);
            if plan.strict {
                return Err(EngineError::ConvergenceTimeout {
                    iterations,
                    max_standard_error,
                    tolerance,
                });
            }
            tracing::warn!(
                iterations,
                max_standard_error,
                tolerance,
                achieved_confidence,
                "approximation stopped at the iteration budget before converging"
            );
        }

        Ok(ApproximateOutcome {
            values: stats.iter().map(RunningStats::mean).collect(),
            standard_errors: stats.iter().map(RunningStats::standard_error).collect(),
            samples: stats.iter().map(RunningStats::count).collect(),
            iterations,
            converged,
            max_standard_error: max_se,
            achieved_confidence,
        })
    }
}

fn sample_batch(
    evaluator: &CoalitionEvaluator<'_>,
    n: usize,
    batch: &PermutationBatch,
    seed: u64,
) -> Result<Vec<RunningStats>> {
    let mut rng = batch.rng(seed);
    let mut stats = vec![RunningStats::new(); n];
    let mut order = (0..n).collect::<Vec<_>>();
    for _ in 0..batch.count {
        order.shuffle(&mut rng);
        let mut coalition = Coalition::empty(n);
        let mut previous = 0.0;
        for &member in &order {
            coalition.insert(member);
            let value = evaluator.value(&coalition)?;
            stats[member].push(value - previous);
            previous = value;
        }
    }
    Ok(stats)
}

/// Largest per-member standard error, `None` until every member has two samples.
fn max_standard_error(stats: &[RunningStats]) -> Option<f64> {
    stats
        .iter()
        .map(RunningStats::standard_error)
        .try_fold(0.0_f64, |max, se| se.map(|se| max.max(se)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(seed: u64) -> SamplingPlan {
        SamplingPlan {
            seed,
            batch_size: 10,
            round_batches: 4,
            min_iterations: 20,
            max_iterations: 400,
            tolerance: 0.01,
            z: 1.96,
            strict: false,
        }
    }

    fn weighted(c: &Coalition) -> f64 {
        let sum = c
            .members()
            .map(|i| f64::from(u32::try_from(i).unwrap()) + 1.0)
            .sum::<f64>();
        // superadditive bonus so marginals vary with the prefix
        sum + 0.05 * sum * sum
    }

    fn solve(n: usize, workers: usize, plan: SamplingPlan) -> Result<ApproximateOutcome> {
        let value_fn = weighted;
        let grand = weighted(&Coalition::full(n));
        ApproximateSolver::new(WorkerPool::new(workers), plan).solve(
            n,
            grand,
            &value_fn,
            &MemoCache::default(),
            &CancelToken::default(),
        )
    }

    #[test]
    fn test_batch_display() {
        let batch = PermutationBatch {
            index: 3,
            start: 75,
            count: 25,
        };
        assert_eq!(batch.to_string(), "permutation batch #3 (permutations 75..100)");
    }

    #[test]
    fn test_additive_game_converges_immediately() {
        // every marginal equals the member's own weight, so SE is 0
        let value_fn = |c: &Coalition| {
            c.members()
                .map(|i| f64::from(u32::try_from(i).unwrap()) + 1.0)
                .sum::<f64>()
        };
        let outcome = ApproximateSolver::new(WorkerPool::new(2), plan(1))
            .solve(4, 10.0, &value_fn, &MemoCache::default(), &CancelToken::default())
            .unwrap();
        assert!(outcome.converged);
        assert_eq!(outcome.iterations, 40);
        assert_eq!(outcome.achieved_confidence, 1.0);
        for (i, value) in outcome.values.iter().enumerate() {
            assert!((value - f64::from(u32::try_from(i).unwrap()) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_same_seed_same_output_any_worker_count() {
        let one = solve(8, 1, plan(42)).unwrap();
        let many = solve(8, 6, plan(42)).unwrap();
        assert_eq!(one, many);
        let other = solve(8, 1, plan(43)).unwrap();
        assert_ne!(one.values, other.values);
    }

    #[test]
    fn test_marginals_telescope_to_grand_value() {
        let outcome = solve(7, 3, plan(5)).unwrap();
        let grand = weighted(&Coalition::full(7));
        let total = outcome.values.iter().sum::<f64>();
        assert!((total - grand).abs() < 1e-9 * grand);
        assert!(outcome.samples.iter().all(|s| *s == outcome.iterations as u64));
    }

    #[test]
    fn test_iteration_budget_is_never_exceeded() {
        let mut p = plan(9);
        p.tolerance = 1e-12;
        p.max_iterations = 37;
        let outcome = solve(6, 4, p).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 37);
        assert!(outcome.achieved_confidence < 0.5);
    }

    #[test]
    fn test_strict_mode_fails_without_convergence() {
        let mut p = plan(9);
        p.tolerance = 1e-12;
        p.max_iterations = 50;
        p.strict = true;
        let err = solve(6, 2, p).unwrap_err();
        match err {
            EngineError::ConvergenceTimeout { iterations, .. } => assert_eq!(iterations, 50),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_single_permutation_has_no_standard_error() {
        let mut p = plan(3);
        p.max_iterations = 1;
        let outcome = solve(5, 1, p).unwrap();
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.max_standard_error, None);
        assert!(outcome.standard_errors.iter().all(Option::is_none));
        assert_eq!(outcome.achieved_confidence, 0.0);
    }
}
