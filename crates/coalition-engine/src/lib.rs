//! Shapley-value attribution of team performance to individual members.
//!
//! The crate turns a roster's raw per-member statistics into a ranked list of
//! contribution shares:
//!
//! - [`schema`] / [`member`]: the validated input table and the [`MembershipSet`] built
//!   from it.
//! - [`normalizer`]: per-column rescaling into a [`FeatureMatrix`].
//! - [`value`]: the coalition value function `v(S)` and its default weighted model.
//! - [`exact`] / [`approx`]: exact enumeration for small sets, permutation sampling for
//!   large ones.
//! - [`scheduler`] / [`cache`]: the worker pool and the run-scoped memo cache.
//! - [`aggregate`]: shares against `v(N)`, dense ranks, reconciliation error.
//! - [`engine`]: [`ShapleyEngine`], which ties a run together.
//!
//! # Example
//!
//! ```
//! use coalition_engine::{
//!     Coalition, EngineConfig, Member, MembershipSet, ShapleyEngine, schema::Metric,
//! };
//!
//! let mut striker = [0.0; Metric::LEN];
//! striker[Metric::Goals.index()] = 2.0;
//! let mut winger = [0.0; Metric::LEN];
//! winger[Metric::Goals.index()] = 1.0;
//! let set = MembershipSet::new(
//!     "demo",
//!     vec![Member::new("striker", striker), Member::new("winger", winger)],
//! )?;
//!
//! let goals = [2.0, 1.0];
//! let value_fn = move |c: &Coalition| c.members().map(|i| goals[i]).sum::<f64>();
//! let report = ShapleyEngine::new(EngineConfig::default())?.analyze(&set, &value_fn)?;
//!
//! assert_eq!(report.results[0].member_id.0, "striker");
//! assert_eq!(report.results[0].rank, 1);
//! # Ok::<(), coalition_engine::EngineError>(())
//! ```

pub mod aggregate;
pub mod approx;
pub mod cache;
pub mod coalition;
pub mod coalition_evaluator;
pub mod engine;
pub mod error;
pub mod exact;
pub mod interface;
pub mod member;
pub mod normalizer;
pub mod scheduler;
pub mod schema;
pub mod value;

pub use self::{
    aggregate::ContributionResult,
    cache::{CacheStats, CoalitionStore, MemoCache, StoredValue},
    coalition::Coalition,
    engine::{EngineConfig, RunMetadata, RunReport, ShapleyEngine, SolverMode},
    error::{EngineError, Result},
    interface::{FeatureProvider, ResultSink, RosterKey},
    member::{Member, MemberId, MembershipSet},
    normalizer::{FeatureMatrix, FeatureVector},
    scheduler::CancelToken,
    value::{CoalitionValue, ValueWeights, WeightedValueFunction},
};
