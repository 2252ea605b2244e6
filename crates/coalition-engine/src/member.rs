//! Members and membership sets.
//!
//! A [`MembershipSet`] is the roster under analysis for one team-period. It is built once
//! per run from a [`RawTable`] and is immutable afterwards. Members are kept sorted by id,
//! so a member's index (its bit in a [`Coalition`](crate::coalition::Coalition)) is
//! canonical regardless of the row order the provider used.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    error::{EngineError, Result},
    schema::{MEMBER_ID_COLUMN, Metric, RawCell, RawTable},
};

/// Identifier of a member (player).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One member with its raw per-period metrics.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    id: MemberId,
    metrics: [f64; Metric::LEN],
}

impl Member {
    /// Creates a member from already validated metrics.
    ///
    /// # Panics
    ///
    /// Panics if any metric is negative or not finite.
    #[must_use]
    pub fn new(id: impl Into<MemberId>, metrics: [f64; Metric::LEN]) -> Self {
        assert!(
            metrics.iter().all(|v| v.is_finite() && *v >= 0.0),
            "member metrics must be finite and non-negative"
        );
        Self {
            id: id.into(),
            metrics,
        }
    }

    #[must_use]
    pub fn id(&self) -> &MemberId {
        &self.id
    }

    #[must_use]
    pub fn metric(&self, metric: Metric) -> f64 {
        self.metrics[metric.index()]
    }

    #[must_use]
    pub fn metrics(&self) -> &[f64; Metric::LEN] {
        &self.metrics
    }

    #[must_use]
    pub fn minutes_played(&self) -> f64 {
        self.metric(Metric::MinutesPlayed)
    }
}

/// The members analysed together in one run.
///
/// Invariant: at least one member, ids unique, members sorted by id.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipSet {
    id: String,
    members: Vec<Member>,
}

impl MembershipSet {
    /// Builds a membership set from members.
    pub fn new(id: impl Into<String>, mut members: Vec<Member>) -> Result<Self> {
        if members.is_empty() {
            return Err(EngineError::invalid_feature(
                MEMBER_ID_COLUMN,
                None,
                "membership set is empty",
            ));
        }
        members.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(dup) = members.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(EngineError::invalid_feature(
                MEMBER_ID_COLUMN,
                Some(dup[0].id.to_string()),
                "duplicate member id",
            ));
        }
        Ok(Self {
            id: id.into(),
            members,
        })
    }

    /// Validates a raw table against the metric schema and builds the membership set.
    ///
    /// Missing cells count as 0. Extra columns are ignored. Fails with
    /// [`EngineError::InvalidFeatureData`] on a missing required column, a non-numeric,
    /// negative or non-finite metric, a missing or duplicate member id, or an empty table.
    pub fn from_table(id: impl Into<String>, table: &RawTable) -> Result<Self> {
        let id_col = table.column_index(MEMBER_ID_COLUMN).ok_or_else(|| {
            EngineError::invalid_feature(MEMBER_ID_COLUMN, None, "required column is missing")
        })?;
        let mut metric_cols = [0; Metric::LEN];
        for metric in Metric::ALL {
            metric_cols[metric.index()] = table.column_index(metric.column()).ok_or_else(|| {
                EngineError::invalid_feature(metric.column(), None, "required column is missing")
            })?;
        }
        if table.is_empty() {
            return Err(EngineError::invalid_feature(
                MEMBER_ID_COLUMN,
                None,
                "membership set is empty",
            ));
        }

        let mut seen = BTreeSet::new();
        let mut members = Vec::with_capacity(table.rows().len());
        for (row_index, row) in table.rows().iter().enumerate() {
            let member_id = parse_member_id(&row[id_col], row_index)?;
            if !seen.insert(member_id.clone()) {
                return Err(EngineError::invalid_feature(
                    MEMBER_ID_COLUMN,
                    Some(member_id.to_string()),
                    "duplicate member id",
                ));
            }
            let mut metrics = [0.0; Metric::LEN];
            for metric in Metric::ALL {
                let cell = &row[metric_cols[metric.index()]];
                metrics[metric.index()] = parse_metric(cell, metric, &member_id)?;
            }
            members.push(Member {
                id: member_id,
                metrics,
            });
        }
        Self::new(id, members)
    }

    /// Identifier of the set (e.g. `team/season`), used to key persisted coalition values.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false`; present for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Index of a member by id.
    #[must_use]
    pub fn index_of(&self, id: &MemberId) -> Option<usize> {
        self.members.binary_search_by(|m| m.id.cmp(id)).ok()
    }
}

fn parse_member_id(cell: &RawCell, row_index: usize) -> Result<MemberId> {
    let row_label = || Some(format!("row #{row_index}"));
    match cell {
        RawCell::Text(text) if !text.trim().is_empty() => Ok(MemberId(text.trim().to_owned())),
        RawCell::Number(value) if value.is_finite() => Ok(MemberId(value.to_string())),
        RawCell::Number(_) => Err(EngineError::invalid_feature(
            MEMBER_ID_COLUMN,
            row_label(),
            "member id is not finite",
        )),
        RawCell::Text(_) | RawCell::Missing => Err(EngineError::invalid_feature(
            MEMBER_ID_COLUMN,
            row_label(),
            "member id is missing",
        )),
    }
}

fn parse_metric(cell: &RawCell, metric: Metric, member: &MemberId) -> Result<f64> {
    let invalid = |reason: String| {
        EngineError::invalid_feature(metric.column(), Some(member.to_string()), reason)
    };
    match cell {
        RawCell::Missing => Ok(0.0),
        RawCell::Text(text) => Err(invalid(format!("non-numeric value '{text}'"))),
        RawCell::Number(value) if !value.is_finite() => {
            Err(invalid(format!("non-finite value {value}")))
        }
        RawCell::Number(value) if *value < 0.0 => Err(invalid(format!("negative value {value}"))),
        RawCell::Number(value) => Ok(*value),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Header with the id column followed by every metric column.
    pub(crate) fn full_header() -> Vec<String> {
        let mut columns = vec![MEMBER_ID_COLUMN.to_owned()];
        columns.extend(Metric::ALL.iter().map(|m| m.column().to_owned()));
        columns
    }

    pub(crate) fn row(id: &str, metrics: [f64; Metric::LEN]) -> Vec<RawCell> {
        let mut row = vec![RawCell::Text(id.to_owned())];
        row.extend(metrics.iter().map(|v| RawCell::Number(*v)));
        row
    }

    #[test]
    fn test_from_table_sorts_by_id() {
        let mut table = RawTable::new(full_header());
        table.push_row(row("zoe", [90.0; Metric::LEN]));
        table.push_row(row("adam", [45.0; Metric::LEN]));
        let set = MembershipSet::from_table("t/2024", &table).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.members()[0].id(), &MemberId::from("adam"));
        assert_eq!(set.index_of(&MemberId::from("zoe")), Some(1));
        assert_eq!(set.id(), "t/2024");
    }

    #[test]
    fn test_missing_cells_are_zero_and_extra_columns_ignored() {
        let mut columns = full_header();
        columns.push("shirt_colour".to_owned());
        let mut table = RawTable::new(columns);
        let mut cells = row("a", [1.0; Metric::LEN]);
        cells[1 + Metric::Goals.index()] = RawCell::Missing;
        cells.push(RawCell::Text("red".to_owned()));
        table.push_row(cells);
        let set = MembershipSet::from_table("s", &table).unwrap();
        assert_eq!(set.members()[0].metric(Metric::Goals), 0.0);
        assert_eq!(set.members()[0].metric(Metric::Assists), 1.0);
    }

    #[test]
    fn test_missing_required_column() {
        let columns = full_header()
            .into_iter()
            .filter(|c| c != "blocks")
            .collect::<Vec<_>>();
        let mut table = RawTable::new(columns);
        table.push_row(vec![RawCell::Text("a".to_owned())]);
        let err = MembershipSet::from_table("s", &table).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidFeatureData { ref column, row: None, .. } if column == "blocks"
        ));
    }

    #[test]
    fn test_non_numeric_value_names_column_and_member() {
        let mut table = RawTable::new(full_header());
        let mut cells = row("p9", [1.0; Metric::LEN]);
        cells[1 + Metric::KeyPasses.index()] = RawCell::Text("lots".to_owned());
        table.push_row(cells);
        let err = MembershipSet::from_table("s", &table).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidFeatureData {
                column: "key_passes".to_owned(),
                row: Some("p9".to_owned()),
                reason: "non-numeric value 'lots'".to_owned(),
            }
        );
    }

    #[test]
    fn test_negative_and_non_finite_values_rejected() {
        for bad in [-1.0, f64::NAN, f64::INFINITY] {
            let mut table = RawTable::new(full_header());
            let mut cells = row("p1", [1.0; Metric::LEN]);
            cells[1] = RawCell::Number(bad);
            table.push_row(cells);
            let err = MembershipSet::from_table("s", &table).unwrap_err();
            assert!(err.is_invalid_feature_data());
        }
    }

    #[test]
    fn test_empty_table_rejected() {
        let table = RawTable::new(full_header());
        let err = MembershipSet::from_table("s", &table).unwrap_err();
        assert!(err.is_invalid_feature_data());
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let mut table = RawTable::new(full_header());
        table.push_row(row("a", [1.0; Metric::LEN]));
        table.push_row(row("a", [2.0; Metric::LEN]));
        let err = MembershipSet::from_table("s", &table).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidFeatureData { row: Some(ref r), .. } if r == "a"
        ));
    }

    #[test]
    fn test_numeric_member_id() {
        let mut table = RawTable::new(full_header());
        let mut cells = row("x", [0.0; Metric::LEN]);
        cells[0] = RawCell::Number(17.0);
        table.push_row(cells);
        let set = MembershipSet::from_table("s", &table).unwrap();
        assert_eq!(set.members()[0].id().0, "17");
    }
}
