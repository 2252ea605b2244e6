//! Normalization and ranking of raw Shapley values.
//!
//! Shares are computed against the grand-coalition value, `share_i = φ_i / v(N)`. Any
//! gap between `Σ φ_i` and `v(N)` is reported as the reconciliation error rather than
//! rescaled away, so sampling bias stays visible to the caller.
//!
//! Ranks are dense: 1 is the largest contribution, tied members share a rank and the
//! next distinct value takes the next integer. Two values count as tied when they differ
//! by less than [`TIE_TOLERANCE`] relative to `v(N)`, which absorbs the last-bit noise
//! of summing the same terms in a different order.

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    member::{MemberId, MembershipSet},
};

/// Relative difference under which two contributions share a rank.
pub const TIE_TOLERANCE: f64 = 1e-9;

/// Final attribution of one member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionResult {
    pub member_id: MemberId,
    /// Shapley value `φ_i` in units of `v`.
    pub raw_value: f64,
    /// `φ_i / v(N)`.
    pub share: f64,
    /// Dense rank, 1 = highest contribution.
    pub rank: usize,
    /// Standard error of the estimate; `None` for exact values.
    pub standard_error: Option<f64>,
    /// Number of marginal contributions sampled; `None` for exact values.
    pub samples: Option<u64>,
}

/// Ranked results plus the efficiency diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub results: Vec<ContributionResult>,
    /// `Σ φ_i − v(N)`.
    pub reconciliation_error: f64,
}

/// Per-member estimate as produced by a solver, in membership order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub standard_error: Option<f64>,
    pub samples: Option<u64>,
}

impl Estimate {
    #[must_use]
    pub fn exact(value: f64) -> Self {
        Self {
            value,
            standard_error: None,
            samples: None,
        }
    }
}

/// Normalizes, ranks and sorts the estimates of `set`.
///
/// Output is ordered by rank, then member id, independent of the order in which the
/// estimates were computed.
pub fn aggregate(
    set: &MembershipSet,
    estimates: &[Estimate],
    grand_value: f64,
) -> Result<Aggregate> {
    if !grand_value.is_finite() || grand_value <= 0.0 {
        return Err(EngineError::DegenerateResult { grand_value });
    }
    assert_eq!(set.len(), estimates.len(), "one estimate per member");

    let mut results = set
        .members()
        .iter()
        .zip(estimates)
        .map(|(member, estimate)| ContributionResult {
            member_id: member.id().clone(),
            raw_value: estimate.value,
            share: estimate.value / grand_value,
            rank: 0,
            standard_error: estimate.standard_error,
            samples: estimate.samples,
        })
        .collect::<Vec<_>>();
    results.sort_by(|a, b| {
        b.raw_value
            .total_cmp(&a.raw_value)
            .then_with(|| a.member_id.cmp(&b.member_id))
    });

    let tie = TIE_TOLERANCE * grand_value;
    let mut rank = 0;
    let mut previous: Option<f64> = None;
    for result in &mut results {
        if previous.is_none_or(|p| p - result.raw_value > tie) {
            rank += 1;
            previous = Some(result.raw_value);
        }
        result.rank = rank;
    }
    // ties within tolerance may have been sorted by value, not id
    results.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.member_id.cmp(&b.member_id)));

    let reconciliation_error = estimates.iter().map(|e| e.value).sum::<f64>() - grand_value;
    Ok(Aggregate {
        results,
        reconciliation_error,
    })
}
