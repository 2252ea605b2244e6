//! Coalition value functions.
//!
//! A value function is the characteristic function `v(S)` of the cooperative game: it
//! assigns a scalar "team value" to every coalition. Any `Fn(&Coalition) -> f64` that is
//! `Send + Sync` is a [`CoalitionValue`], so callers can plug in their own model.
//!
//! # Default model
//!
//! [`WeightedValueFunction`] scores a coalition from the normalized features of its
//! members `j`:
//!
//! ```text
//! offensive_j  = 1.0·goals + 0.7·assists + 0.5·xG + 0.3·xA
//! defensive_j  = 1.0·tackles_won + 1.0·interceptions + 1.0·clearances + 1.0·blocks
//! possession_j = 0.001·passes_completed + 1.0·dribbles_completed + 1.0·key_passes
//! raw_j        = 0.4·offensive_j + 0.3·defensive_j + 0.3·possession_j
//! v(S)         = max(0, Σ_{j∈S} raw_j × min(1, minutes_j / baseline_minutes))
//! ```
//!
//! Minutes are raw, not normalized, and scale each member's sub-scores separately. A
//! member's term only depends on its own normalized row and minutes, so raising one of its
//! features never lowers its contribution, and a member whose features are all
//! zero never changes `v(S)`. All weights are non-negative.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    coalition::Coalition,
    error::{EngineError, Result},
    normalizer::FeatureMatrix,
    schema::Metric,
};

/// Characteristic function of the coalition game.
///
/// Implementations must be pure: the same coalition always yields the same value, and
/// concurrent calls from several workers must be safe. `v(∅)` is forced to 0 by the
/// engine regardless of what the implementation returns.
pub trait CoalitionValue: Send + Sync {
    /// Returns `v(S)` for `coalition`.
    fn value(&self, coalition: &Coalition) -> f64;
}

impl<F> CoalitionValue for F
where
    F: Fn(&Coalition) -> f64 + Send + Sync,
{
    fn value(&self, coalition: &Coalition) -> f64 {
        self(coalition)
    }
}

/// Weights of the offensive sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OffensiveWeights {
    pub goals: f64,
    pub assists: f64,
    pub expected_goals: f64,
    pub expected_assists: f64,
}

impl Default for OffensiveWeights {
    fn default() -> Self {
        Self {
            goals: 1.0,
            assists: 0.7,
            expected_goals: 0.5,
            expected_assists: 0.3,
        }
    }
}

/// Weights of the defensive sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefensiveWeights {
    pub tackles_won: f64,
    pub interceptions: f64,
    pub clearances: f64,
    pub blocks: f64,
}

impl Default for DefensiveWeights {
    fn default() -> Self {
        Self {
            tackles_won: 1.0,
            interceptions: 1.0,
            clearances: 1.0,
            blocks: 1.0,
        }
    }
}

/// Weights of the possession sub-score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PossessionWeights {
    pub passes_completed: f64,
    pub dribbles_completed: f64,
    pub key_passes: f64,
}

impl Default for PossessionWeights {
    fn default() -> Self {
        Self {
            passes_completed: 0.001,
            dribbles_completed: 1.0,
            key_passes: 1.0,
        }
    }
}

/// How the three sub-scores are blended into one value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub offensive: f64,
    pub defensive: f64,
    pub possession: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            offensive: 0.4,
            defensive: 0.3,
            possession: 0.3,
        }
    }
}

/// Full configuration of [`WeightedValueFunction`].
///
/// Every field has a default, so a partial JSON document only overrides what it names.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValueWeights {
    pub offensive: OffensiveWeights,
    pub defensive: DefensiveWeights,
    pub possession: PossessionWeights,
    pub blend: BlendWeights,
    /// Minutes one member plays at full strength.
    pub baseline_minutes: f64,
}

impl Default for ValueWeights {
    fn default() -> Self {
        Self {
            offensive: OffensiveWeights::default(),
            defensive: DefensiveWeights::default(),
            possession: PossessionWeights::default(),
            blend: BlendWeights::default(),
            baseline_minutes: 90.0,
        }
    }
}

impl ValueWeights {
    /// Feature weights paired with the metric they apply to, per sub-score.
    fn offensive_terms(&self) -> [(Metric, f64); 4] {
        let w = &self.offensive;
        [
            (Metric::Goals, w.goals),
            (Metric::Assists, w.assists),
            (Metric::ExpectedGoals, w.expected_goals),
            (Metric::ExpectedAssists, w.expected_assists),
        ]
    }

    fn defensive_terms(&self) -> [(Metric, f64); 4] {
        let w = &self.defensive;
        [
            (Metric::TacklesWon, w.tackles_won),
            (Metric::Interceptions, w.interceptions),
            (Metric::Clearances, w.clearances),
            (Metric::Blocks, w.blocks),
        ]
    }

    fn possession_terms(&self) -> [(Metric, f64); 3] {
        let w = &self.possession;
        [
            (Metric::PassesCompleted, w.passes_completed),
            (Metric::DribblesCompleted, w.dribbles_completed),
            (Metric::KeyPasses, w.key_passes),
        ]
    }

    /// Rejects negative or non-finite weights and a non-positive baseline.
    pub fn validate(&self) -> Result<()> {
        let feature_terms = self
            .offensive_terms()
            .into_iter()
            .chain(self.defensive_terms())
            .chain(self.possession_terms());
        for (metric, w) in feature_terms {
            if !is_valid_weight(w) {
                return Err(EngineError::invalid_config(
                    "value_weights",
                    format!("weight for {metric} must be finite and non-negative, got {w}"),
                ));
            }
        }
        let blend = [
            ("offensive", self.blend.offensive),
            ("defensive", self.blend.defensive),
            ("possession", self.blend.possession),
        ];
        for (name, w) in blend {
            if !is_valid_weight(w) {
                return Err(EngineError::invalid_config(
                    "value_weights.blend",
                    format!("{name} blend weight must be finite and non-negative, got {w}"),
                ));
            }
        }
        if !(self.baseline_minutes.is_finite() && self.baseline_minutes > 0.0) {
            return Err(EngineError::invalid_config(
                "value_weights.baseline_minutes",
                format!("must be positive, got {}", self.baseline_minutes),
            ));
        }
        Ok(())
    }
}

fn is_valid_weight(w: f64) -> bool {
    w.is_finite() && w >= 0.0
}

/// Per-coalition breakdown of the default value function.
///
/// The sub-scores are already scaled by each member's minutes factor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueBreakdown {
    pub offensive: f64,
    pub defensive: f64,
    pub possession: f64,
    /// Total raw minutes played by the coalition.
    pub minutes: f64,
    pub value: f64,
}

/// Pre-weighted, minutes-scaled sub-scores of one member.
#[derive(Debug, Clone, Copy)]
struct MemberScore {
    offensive: f64,
    defensive: f64,
    possession: f64,
    minutes: f64,
}

/// The default weighted linear value function over normalized features.
#[derive(Debug, Clone)]
pub struct WeightedValueFunction {
    weights: ValueWeights,
    scores: Arc<[MemberScore]>,
}

impl WeightedValueFunction {
    /// Builds the value function over a normalized feature matrix.
    pub fn new(features: &FeatureMatrix, weights: ValueWeights) -> Result<Self> {
        weights.validate()?;
        let dot = |terms: &[(Metric, f64)], member: usize| {
            let v = features.vector(member);
            terms.iter().map(|(metric, w)| v[*metric] * w).sum::<f64>()
        };
        let scores = (0..features.len())
            .map(|i| {
                let minutes = features.raw_minutes(i);
                let factor = (minutes / weights.baseline_minutes).min(1.0);
                MemberScore {
                    offensive: dot(&weights.offensive_terms(), i) * factor,
                    defensive: dot(&weights.defensive_terms(), i) * factor,
                    possession: dot(&weights.possession_terms(), i) * factor,
                    minutes,
                }
            })
            .collect();
        Ok(Self { weights, scores })
    }

    #[must_use]
    pub fn weights(&self) -> &ValueWeights {
        &self.weights
    }

    /// Computes the sub-scores, minutes and final value of a coalition.
    #[must_use]
    pub fn breakdown(&self, coalition: &Coalition) -> ValueBreakdown {
        let mut offensive = 0.0;
        let mut defensive = 0.0;
        let mut possession = 0.0;
        let mut minutes = 0.0;
        for i in coalition.members() {
            let score = &self.scores[i];
            offensive += score.offensive;
            defensive += score.defensive;
            possession += score.possession;
            minutes += score.minutes;
        }

        let blend = &self.weights.blend;
        let raw = blend.offensive * offensive
            + blend.defensive * defensive
            + blend.possession * possession;

        ValueBreakdown {
            offensive,
            defensive,
            possession,
            minutes,
            value: raw.max(0.0),
        }
    }
}

impl CoalitionValue for WeightedValueFunction {
    fn value(&self, coalition: &Coalition) -> f64 {
        self.breakdown(coalition).value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::member::{Member, MembershipSet};

    fn metrics(pairs: &[(Metric, f64)]) -> [f64; Metric::LEN] {
        let mut m = [0.0; Metric::LEN];
        for (metric, v) in pairs {
            m[metric.index()] = *v;
        }
        m
    }

    fn value_fn(members: Vec<Member>) -> WeightedValueFunction {
        let set = MembershipSet::new("s", members).unwrap();
        let features = FeatureMatrix::from_membership(&set);
        WeightedValueFunction::new(&features, ValueWeights::default()).unwrap()
    }

    #[test]
    fn test_empty_coalition_is_zero() {
        let v = value_fn(vec![Member::new(
            "a",
            metrics(&[(Metric::Goals, 3.0), (Metric::MinutesPlayed, 90.0)]),
        )]);
        assert_eq!(v.value(&Coalition::empty(1)), 0.0);
    }

    #[test]
    fn test_single_full_match_striker() {
        // normalized goals = 1, full 90 minutes => 0.4 * 1.0
        let v = value_fn(vec![Member::new(
            "a",
            metrics(&[(Metric::Goals, 3.0), (Metric::MinutesPlayed, 90.0)]),
        )]);
        let b = v.breakdown(&Coalition::full(1));
        assert_eq!(b.offensive, 1.0);
        assert_eq!(b.minutes, 90.0);
        assert!((b.value - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_minutes_scale_each_member() {
        let v = value_fn(vec![
            Member::new(
                "a",
                metrics(&[(Metric::TacklesWon, 2.0), (Metric::MinutesPlayed, 90.0)]),
            ),
            Member::new(
                "b",
                metrics(&[(Metric::TacklesWon, 2.0), (Metric::MinutesPlayed, 45.0)]),
            ),
        ]);
        let both = v.breakdown(&Coalition::full(2));
        assert_eq!(both.minutes, 135.0);
        assert!((both.defensive - 1.5).abs() < 1e-12);
        assert!((both.value - 0.3 * 1.5).abs() < 1e-12);
        let b_only = v.breakdown(&Coalition::from_indices(2, [1]));
        assert!((b_only.value - 0.3 * 0.5).abs() < 1e-12);

        // extra time beyond the baseline is not rewarded
        let long = value_fn(vec![Member::new(
            "a",
            metrics(&[(Metric::TacklesWon, 2.0), (Metric::MinutesPlayed, 120.0)]),
        )]);
        assert!((long.value(&Coalition::full(1)) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_marginal_never_drops_when_minutes_rise() {
        // a member without minutes joining a teammate who played the full match
        let build = |minutes: f64| {
            value_fn(vec![
                Member::new(
                    "a",
                    metrics(&[(Metric::Goals, 1.0), (Metric::MinutesPlayed, minutes)]),
                ),
                Member::new(
                    "b",
                    metrics(&[(Metric::Goals, 1.0), (Metric::MinutesPlayed, 90.0)]),
                ),
            ])
        };
        let b_only = Coalition::from_indices(2, [1]);
        let mut last = 0.0;
        for minutes in [0.0, 1.0, 30.0, 90.0, 150.0] {
            let v = build(minutes);
            let marginal = v.value(&Coalition::full(2)) - v.value(&b_only);
            assert!(marginal >= last, "{minutes} minutes: {marginal} < {last}");
            last = marginal;
        }
        assert!((last - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_null_member_never_changes_value() {
        let v = value_fn(vec![
            Member::new(
                "a",
                metrics(&[(Metric::Goals, 1.0), (Metric::MinutesPlayed, 70.0)]),
            ),
            Member::new("b", [0.0; Metric::LEN]),
        ]);
        let without = v.value(&Coalition::from_indices(2, [0]));
        let with = v.value(&Coalition::full(2));
        assert_eq!(without, with);
        assert_eq!(v.value(&Coalition::from_indices(2, [1])), 0.0);
    }

    #[test]
    fn test_monotone_in_member_feature() {
        let build = |key_passes: f64| {
            value_fn(vec![
                Member::new(
                    "a",
                    metrics(&[(Metric::KeyPasses, key_passes), (Metric::MinutesPlayed, 80.0)]),
                ),
                Member::new(
                    "b",
                    metrics(&[(Metric::KeyPasses, 10.0), (Metric::MinutesPlayed, 90.0)]),
                ),
            ])
        };
        let low = build(2.0).value(&Coalition::full(2));
        let high = build(6.0).value(&Coalition::full(2));
        assert!(high >= low);
    }

    #[test]
    fn test_closure_is_a_value_function() {
        let goals = [2.0, 1.0, 0.0];
        let v = move |c: &Coalition| c.members().map(|i| goals[i]).sum::<f64>();
        assert_eq!(v.value(&Coalition::full(3)), 3.0);
    }

    #[test]
    fn test_negative_weight_rejected() {
        let mut weights = ValueWeights::default();
        weights.defensive.blocks = -0.5;
        let err = weights.validate().unwrap_err();
        assert!(err.is_invalid_config());

        let mut weights = ValueWeights::default();
        weights.baseline_minutes = 0.0;
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_partial_weights_json_uses_defaults() {
        let weights: ValueWeights =
            serde_json::from_str(r#"{"offensive": {"goals": 2.0}, "baseline_minutes": 60}"#)
                .unwrap();
        assert_eq!(weights.offensive.goals, 2.0);
        assert_eq!(weights.offensive.assists, 0.7);
        assert_eq!(weights.blend, BlendWeights::default());
        assert_eq!(weights.baseline_minutes, 60.0);
    }
}
