//! Analysis runs: solver dispatch, run state and metadata.
//!
//! A [`ShapleyEngine`] owns a validated [`EngineConfig`] and a worker pool. Each call to
//! one of the `analyze*` methods is an independent run with its own [`MemoCache`] and
//! [`CancelToken`]; nothing is shared between runs, and every error is local to the run
//! that raised it.
//!
//! Dispatch is by membership size: sets of at most `exact_threshold` members (and every
//! single-member set) use the [`ExactSolver`], larger sets the [`ApproximateSolver`].
//! `force_mode` overrides the choice.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rand::Rng as _;
use serde::{Deserialize, Serialize};

use crate::{
    aggregate::{self, ContributionResult, Estimate},
    approx::{ApproximateSolver, SamplingPlan},
    cache::{CacheStats, CoalitionStore, DEFAULT_CACHE_CAPACITY, MemoCache},
    coalition::Coalition,
    coalition_evaluator::CoalitionEvaluator,
    error::{EngineError, Result},
    exact::{ExactSolver, MAX_EXACT_MEMBERS},
    member::MembershipSet,
    normalizer::FeatureMatrix,
    scheduler::{CancelToken, WorkerPool},
    value::{CoalitionValue, ValueWeights, WeightedValueFunction},
};

/// Relative efficiency tolerance of the exact solver.
const EXACT_EFFICIENCY_TOLERANCE: f64 = 1e-6;

/// Which solver produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum SolverMode {
    #[display("exact")]
    Exact,
    #[display("approximate")]
    Approximate,
}

/// Tunables of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Largest membership set solved exactly.
    pub exact_threshold: usize,
    /// Permutation budget of the approximate solver.
    pub max_iterations: usize,
    /// Permutations sampled before convergence is first checked.
    pub min_iterations: usize,
    /// Target standard error, relative to `v(N)`.
    pub confidence_tolerance: f64,
    pub confidence_z: f64,
    /// Permutations per work unit.
    pub batch_size: usize,
    /// Work units per convergence round.
    pub round_batches: usize,
    /// Worker count; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub max_workers: Option<usize>,
    /// Sampling seed; `None` draws one and records it in the metadata.
    pub seed: Option<u64>,
    pub timeout: Option<Duration>,
    /// Fail instead of warning when sampling does not converge.
    pub strict_convergence: bool,
    pub cache_capacity: usize,
    pub force_mode: Option<SolverMode>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exact_threshold: 12,
            max_iterations: 1000,
            min_iterations: 100,
            confidence_tolerance: 0.01,
            confidence_z: 1.96,
            batch_size: 25,
            round_batches: 8,
            workers: None,
            max_workers: None,
            seed: None,
            timeout: None,
            strict_convergence: false,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            force_mode: None,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_EXACT_MEMBERS).contains(&self.exact_threshold) {
            return Err(EngineError::invalid_config(
                "exact_threshold",
                format!(
                    "must be between 1 and {MAX_EXACT_MEMBERS}, got {}",
                    self.exact_threshold
                ),
            ));
        }
        if self.max_iterations == 0 {
            return Err(EngineError::invalid_config("max_iterations", "must be at least 1"));
        }
        if !(self.confidence_tolerance.is_finite() && self.confidence_tolerance > 0.0) {
            return Err(EngineError::invalid_config(
                "confidence_tolerance",
                format!("must be positive, got {}", self.confidence_tolerance),
            ));
        }
        if !(self.confidence_z.is_finite() && self.confidence_z > 0.0) {
            return Err(EngineError::invalid_config(
                "confidence_z",
                format!("must be positive, got {}", self.confidence_z),
            ));
        }
        if self.batch_size == 0 {
            return Err(EngineError::invalid_config("batch_size", "must be at least 1"));
        }
        if self.round_batches == 0 {
            return Err(EngineError::invalid_config("round_batches", "must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(EngineError::invalid_config("workers", "must be at least 1"));
        }
        if self.max_workers == Some(0) {
            return Err(EngineError::invalid_config("max_workers", "must be at least 1"));
        }
        Ok(())
    }
}

/// Everything a result sink needs to know about how results were produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub membership_set_id: String,
    pub member_count: usize,
    pub solver: SolverMode,
    /// `v(N)`.
    pub grand_value: f64,
    /// Permutations sampled (approximate only).
    pub iterations: Option<usize>,
    /// Whether sampling met the tolerance (approximate only).
    pub converged: Option<bool>,
    /// 1.0 for exact runs.
    pub achieved_confidence: f64,
    pub max_standard_error: Option<f64>,
    /// `Σ φ_i − v(N)`.
    pub reconciliation_error: f64,
    pub seed: Option<u64>,
    pub workers: usize,
    pub cache: CacheStats,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
}

/// Terminal output of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<ContributionResult>,
    pub metadata: RunMetadata,
}

/// Entry point of the library.
#[derive(Debug, Clone)]
pub struct ShapleyEngine {
    config: EngineConfig,
    pool: WorkerPool,
}

impl ShapleyEngine {
    /// Validates `config` and sizes the worker pool.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let pool = match config.workers {
            Some(workers) => {
                WorkerPool::new(config.max_workers.map_or(workers, |cap| workers.min(cap)))
            }
            None => WorkerPool::with_available_parallelism(config.max_workers),
        };
        Ok(Self { config, pool })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    /// A fresh cache sized by the configuration.
    #[must_use]
    pub fn new_cache(&self) -> MemoCache {
        MemoCache::new(self.config.cache_capacity)
    }

    /// A fresh token whose deadline is the configured timeout, counted from now.
    #[must_use]
    pub fn new_token(&self) -> CancelToken {
        CancelToken::new(self.config.timeout)
    }

    /// The solver used for a set of `n` members.
    #[must_use]
    pub fn select_mode(&self, n: usize) -> SolverMode {
        if n == 1 {
            return SolverMode::Exact;
        }
        match self.config.force_mode {
            Some(mode) => mode,
            None if n <= self.config.exact_threshold => SolverMode::Exact,
            None => SolverMode::Approximate,
        }
    }

    /// Runs the default value function over normalized features.
    pub fn analyze_features(
        &self,
        set: &MembershipSet,
        features: &FeatureMatrix,
        weights: ValueWeights,
    ) -> Result<RunReport> {
        let value_fn = WeightedValueFunction::new(features, weights)?;
        self.analyze(set, &value_fn)
    }

    /// Runs with a fresh cache and token.
    pub fn analyze(&self, set: &MembershipSet, value_fn: &dyn CoalitionValue) -> Result<RunReport> {
        self.analyze_with(set, value_fn, &self.new_cache(), &self.new_token())
    }

    /// Runs with a cache preloaded from `store`, saving the cache back afterwards.
    ///
    /// Store failures are logged and otherwise ignored: they cost speed, not correctness.
    pub fn analyze_cached<S>(
        &self,
        set: &MembershipSet,
        value_fn: &dyn CoalitionValue,
        store: &S,
    ) -> Result<RunReport>
    where
        S: CoalitionStore,
    {
        let cache = self.new_cache();
        match store.load(set.id()) {
            Ok(stored) => {
                let loaded = cache.preload(set.len(), &stored);
                tracing::debug!(set = set.id(), loaded, "preloaded coalition values");
            }
            Err(err) => {
                tracing::warn!(set = set.id(), %err, "failed to load stored coalition values");
            }
        }

        let report = self.analyze_with(set, value_fn, &cache, &self.new_token())?;

        if let Err(err) = store.save(set.id(), &cache.to_stored()) {
            tracing::warn!(set = set.id(), %err, "failed to save coalition values");
        }
        Ok(report)
    }

    /// Runs with a caller-provided cache and token.
    ///
    /// The token can be cancelled from another thread; the run then fails with
    /// [`EngineError::Cancelled`] instead of returning partial values.
    pub fn analyze_with(
        &self,
        set: &MembershipSet,
        value_fn: &dyn CoalitionValue,
        cache: &MemoCache,
        token: &CancelToken,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let n = set.len();
        let mode = self.select_mode(n);
        tracing::info!(
            set = set.id(),
            members = n,
            %mode,
            workers = self.workers(),
            "starting analysis"
        );

        let grand_value = self
            .pool
            .run(&["grand coalition"], token, |_| {
                CoalitionEvaluator::new(value_fn, cache, token).value(&Coalition::full(n))
            })?
            .into_iter()
            .next()
            .unwrap_or_default();
        if grand_value <= 0.0 {
            return Err(EngineError::DegenerateResult { grand_value });
        }

        let (estimates, diagnostics) = match mode {
            SolverMode::Exact => {
                let values = ExactSolver::new(self.pool).solve(set, value_fn, cache, token)?;
                let estimates = values.into_iter().map(Estimate::exact).collect::<Vec<_>>();
                (estimates, Diagnostics::exact())
            }
            SolverMode::Approximate => {
                let seed = self.config.seed.unwrap_or_else(|| rand::rng().random());
                let plan = SamplingPlan {
                    seed,
                    batch_size: self.config.batch_size,
                    round_batches: self.config.round_batches,
                    min_iterations: self.config.min_iterations,
                    max_iterations: self.config.max_iterations,
                    tolerance: self.config.confidence_tolerance,
                    z: self.config.confidence_z,
                    strict: self.config.strict_convergence,
                };
                let outcome = ApproximateSolver::new(self.pool, plan)
                    .solve(n, grand_value, value_fn, cache, token)?;
                let estimates = outcome
                    .values
                    .iter()
                    .zip(&outcome.standard_errors)
                    .zip(&outcome.samples)
                    .map(|((value, se), samples)| Estimate {
                        value: *value,
                        standard_error: *se,
                        samples: Some(*samples),
                    })
                    .collect::<Vec<_>>();
                let diagnostics = Diagnostics {
                    iterations: Some(outcome.iterations),
                    converged: Some(outcome.converged),
                    achieved_confidence: outcome.achieved_confidence,
                    max_standard_error: outcome.max_standard_error,
                    seed: Some(seed),
                };
                (estimates, diagnostics)
            }
        };

        let aggregate = aggregate::aggregate(set, &estimates, grand_value)?;
        let allowed = match mode {
            SolverMode::Exact => EXACT_EFFICIENCY_TOLERANCE,
            SolverMode::Approximate => self.config.confidence_tolerance,
        } * grand_value;
        if aggregate.reconciliation_error.abs() > allowed {
            tracing::warn!(
                reconciliation_error = aggregate.reconciliation_error,
                allowed,
                "sum of contributions deviates from the grand coalition value"
            );
        }

        let duration = start.elapsed();
        let metadata = RunMetadata {
            membership_set_id: set.id().to_owned(),
            member_count: n,
            solver: mode,
            grand_value,
            iterations: diagnostics.iterations,
            converged: diagnostics.converged,
            achieved_confidence: diagnostics.achieved_confidence,
            max_standard_error: diagnostics.max_standard_error,
            reconciliation_error: aggregate.reconciliation_error,
            seed: diagnostics.seed,
            workers: self.workers(),
            cache: cache.stats(),
            started_at,
            duration_secs: duration.as_secs_f64(),
        };
        tracing::info!(
            set = set.id(),
            %mode,
            grand_value,
            iterations = ?metadata.iterations,
            achieved_confidence = metadata.achieved_confidence,
            cache_hit_rate = metadata.cache.hit_rate(),
            ?duration,
            "analysis finished"
        );
        Ok(RunReport {
            results: aggregate.results,
            metadata,
        })
    }
}

struct Diagnostics {
    iterations: Option<usize>,
    converged: Option<bool>,
    achieved_confidence: f64,
    max_standard_error: Option<f64>,
    seed: Option<u64>,
}

impl Diagnostics {
    fn exact() -> Self {
        Self {
            iterations: None,
            converged: None,
            achieved_confidence: 1.0,
            max_standard_error: None,
            seed: None,
        }
    }
}
