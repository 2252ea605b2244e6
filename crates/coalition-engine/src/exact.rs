//! Exact Shapley values by full subset enumeration.
//!
//! For member `i` of an `n`-member set,
//!
//! ```text
//! φ_i = Σ_{S ⊆ N∖{i}} |S|!·(n−|S|−1)!/n! · (v(S ∪ {i}) − v(S))
//! ```
//!
//! The weight only depends on `k = |S|`, so subsets are enumerated one size class at a
//! time (Gosper's hack over the `n−1` other members) and each class sum is scaled once by
//! `1 / (n·C(n−1, k))`. One work unit computes one member's value; summation order inside
//! a unit is fixed, so results are bit-identical for any worker count.

use std::fmt;

use crate::{
    cache::MemoCache,
    coalition::Coalition,
    coalition_evaluator::CoalitionEvaluator,
    error::{EngineError, Result},
    member::{MemberId, MembershipSet},
    scheduler::{CancelToken, WorkerPool},
    value::CoalitionValue,
};

/// Largest set the exact solver accepts (2^25 coalitions per member).
pub const MAX_EXACT_MEMBERS: usize = 25;

/// One member's share of the exact computation.
#[derive(Debug, Clone)]
pub struct ExactUnit {
    member: usize,
    id: MemberId,
}

impl fmt::Display for ExactUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "member '{}'", self.id)
    }
}

/// Enumerating solver, parallel across members.
#[derive(Debug, Clone, Copy)]
pub struct ExactSolver {
    pool: WorkerPool,
}

impl ExactSolver {
    #[must_use]
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }

    /// Computes the Shapley value of every member, in membership order.
    pub fn solve(
        &self,
        set: &MembershipSet,
        value_fn: &dyn CoalitionValue,
        cache: &MemoCache,
        token: &CancelToken,
    ) -> Result<Vec<f64>> {
        let n = set.len();
        if n > MAX_EXACT_MEMBERS {
            return Err(EngineError::invalid_config(
                "exact_threshold",
                format!("exact enumeration supports at most {MAX_EXACT_MEMBERS} members, got {n}"),
            ));
        }
        let weights = size_class_weights(n);
        let units = set
            .members()
            .iter()
            .enumerate()
            .map(|(member, m)| ExactUnit {
                member,
                id: m.id().clone(),
            })
            .collect::<Vec<_>>();

        tracing::debug!(members = n, workers = self.pool.workers(), "exact enumeration");
        self.pool.run(&units, token, |unit| {
            let evaluator = CoalitionEvaluator::new(value_fn, cache, token);
            member_value(&evaluator, n, unit.member, &weights)
        })
    }
}

/// `w_k = 1 / (n·C(n−1, k))` for `k = 0..n`.
#[expect(clippy::cast_precision_loss)]
fn size_class_weights(n: usize) -> Vec<f64> {
    let others = n.saturating_sub(1);
    let mut weights = Vec::with_capacity(others + 1);
    let mut binomial = 1.0_f64;
    for k in 0..=others {
        if k > 0 {
            binomial = binomial * (others - k + 1) as f64 / k as f64;
        }
        weights.push(1.0 / (n as f64 * binomial));
    }
    weights
}

fn member_value(
    evaluator: &CoalitionEvaluator<'_>,
    n: usize,
    member: usize,
    weights: &[f64],
) -> Result<f64> {
    let others = n - 1;
    let mut phi = 0.0;
    for (k, weight) in weights.iter().enumerate() {
        let mut class_sum = 0.0;
        for packed in subsets_of_size(others, k) {
            let without = Coalition::from_mask(spread(packed, member));
            let with = without.with(member);
            class_sum += evaluator.value(&with)? - evaluator.value(&without)?;
        }
        phi += weight * class_sum;
    }
    Ok(phi)
}

/// Inserts a zero bit at position `member`, mapping a subset of the other members onto
/// full member indices.
fn spread(packed: u64, member: usize) -> u64 {
    let low = packed & ((1 << member) - 1);
    let high = (packed >> member) << (member + 1);
    low | high
}

/// All `k`-subsets of `bits` bits in increasing numeric order (Gosper's hack).
fn subsets_of_size(bits: usize, k: usize) -> impl Iterator<Item = u64> {
    let limit = 1_u64 << bits;
    let mut next = (k <= bits).then(|| (1_u64 << k) - 1);
    std::iter::from_fn(move || {
        let current = next?;
        next = if current == 0 {
            None
        } else {
            let lowest = current & current.wrapping_neg();
            let ripple = current + lowest;
            let successor = (((ripple ^ current) >> 2) / lowest) | ripple;
            (successor < limit).then_some(successor)
        };
        Some(current)
    })
}
