//! Feature normalization.
//!
//! Turns raw per-member metrics into bounded, comparable [`FeatureVector`]s. Each metric
//! column is rescaled independently by dividing by its maximum over the membership set,
//! so every dimension lands in \[0.0, 1.0\] and the best member in a column scores 1.0.
//! A column whose maximum is 0 becomes constant 0.
//!
//! The transform is pure: the same membership set always yields the same matrix.

use std::ops::Index;

use crate::{
    error::Result,
    member::MembershipSet,
    schema::{Metric, RawTable},
};

/// Normalized metrics of one member, each dimension in \[0.0, 1.0\].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; Metric::LEN]);

impl FeatureVector {
    #[must_use]
    pub fn get(&self, metric: Metric) -> f64 {
        self.0[metric.index()]
    }

    #[must_use]
    pub fn as_array(&self) -> &[f64; Metric::LEN] {
        &self.0
    }

    /// `true` if every dimension is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }
}

impl Index<Metric> for FeatureVector {
    type Output = f64;

    fn index(&self, metric: Metric) -> &f64 {
        &self.0[metric.index()]
    }
}

/// Read-only table of normalized features, one row per member in membership order.
///
/// Raw minutes are kept alongside the normalized vectors because the value function
/// scales by minutes relative to a full-match baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    vectors: Vec<FeatureVector>,
    raw_minutes: Vec<f64>,
    column_max: [f64; Metric::LEN],
}

impl FeatureMatrix {
    /// Normalizes every metric column of `set` by its column maximum.
    #[must_use]
    pub fn from_membership(set: &MembershipSet) -> Self {
        let mut column_max = [0.0_f64; Metric::LEN];
        for member in set.members() {
            for (max, value) in column_max.iter_mut().zip(member.metrics()) {
                *max = max.max(*value);
            }
        }

        let vectors = set
            .members()
            .iter()
            .map(|member| {
                let mut row = [0.0; Metric::LEN];
                for ((out, value), max) in row.iter_mut().zip(member.metrics()).zip(&column_max) {
                    *out = if *max > 0.0 {
                        (value / max).clamp(0.0, 1.0)
                    } else {
                        0.0
                    };
                }
                FeatureVector(row)
            })
            .collect();
        let raw_minutes = set.members().iter().map(|m| m.minutes_played()).collect();

        Self {
            vectors,
            raw_minutes,
            column_max,
        }
    }

    /// Validates a raw table and normalizes it in one step.
    ///
    /// Fails with [`EngineError::InvalidFeatureData`](crate::EngineError::InvalidFeatureData)
    /// under the same conditions as [`MembershipSet::from_table`].
    pub fn from_table(id: impl Into<String>, table: &RawTable) -> Result<(MembershipSet, Self)> {
        let set = MembershipSet::from_table(id, table)?;
        let matrix = Self::from_membership(&set);
        Ok((set, matrix))
    }

    /// Number of members (rows).
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    #[must_use]
    pub fn vector(&self, member: usize) -> &FeatureVector {
        &self.vectors[member]
    }

    #[must_use]
    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    /// Raw (unnormalized) minutes played by a member.
    #[must_use]
    pub fn raw_minutes(&self, member: usize) -> f64 {
        self.raw_minutes[member]
    }

    /// Column maxima used as divisors.
    #[must_use]
    pub fn column_max(&self) -> &[f64; Metric::LEN] {
        &self.column_max
    }
}
