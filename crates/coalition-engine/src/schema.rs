//! Column schema of the raw feature table.
//!
//! The feature provider hands the engine a [`RawTable`]: a header row and loosely typed
//! cells, exactly as they came out of a file or an upstream API. Validation against the
//! fixed [`Metric`] schema happens once, at ingestion (see
//! [`MembershipSet::from_table`](crate::member::MembershipSet::from_table)), so malformed
//! data fails before any coalition is evaluated.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the required member identifier column.
pub const MEMBER_ID_COLUMN: &str = "member_id";

/// Raw per-period metrics every member row must provide.
///
/// Columns not listed here are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    MinutesPlayed,
    Goals,
    Assists,
    ExpectedGoals,
    ExpectedAssists,
    TacklesWon,
    Interceptions,
    Clearances,
    Blocks,
    PassesCompleted,
    DribblesCompleted,
    KeyPasses,
}

impl Metric {
    /// Number of metric columns.
    pub const LEN: usize = 12;

    /// All metrics in column order.
    pub const ALL: [Metric; Self::LEN] = [
        Metric::MinutesPlayed,
        Metric::Goals,
        Metric::Assists,
        Metric::ExpectedGoals,
        Metric::ExpectedAssists,
        Metric::TacklesWon,
        Metric::Interceptions,
        Metric::Clearances,
        Metric::Blocks,
        Metric::PassesCompleted,
        Metric::DribblesCompleted,
        Metric::KeyPasses,
    ];

    /// Column name in the raw table.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Metric::MinutesPlayed => "minutes_played",
            Metric::Goals => "goals",
            Metric::Assists => "assists",
            Metric::ExpectedGoals => "expected_goals",
            Metric::ExpectedAssists => "expected_assists",
            Metric::TacklesWon => "tackles_won",
            Metric::Interceptions => "interceptions",
            Metric::Clearances => "clearances",
            Metric::Blocks => "blocks",
            Metric::PassesCompleted => "passes_completed",
            Metric::DribblesCompleted => "dribbles_completed",
            Metric::KeyPasses => "key_passes",
        }
    }

    /// Position of this metric inside a feature row.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// A single loosely typed cell of the raw table.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Number(f64),
    Text(String),
    Missing,
}

impl RawCell {
    /// Interprets a textual cell: blank is missing, numeric text is a number.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if text.is_empty() {
            return RawCell::Missing;
        }
        match text.parse::<f64>() {
            Ok(value) => RawCell::Number(value),
            Err(_) => RawCell::Text(text.to_owned()),
        }
    }
}

/// Raw per-member metrics for one membership set, as delivered by a feature provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    columns: Vec<String>,
    rows: Vec<Vec<RawCell>>,
}

impl RawTable {
    /// Creates an empty table with the given header.
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: vec![],
        }
    }

    /// Appends a row; short rows are padded with [`RawCell::Missing`] and extra cells
    /// are dropped.
    pub fn push_row(&mut self, mut row: Vec<RawCell>) {
        row.resize(self.columns.len(), RawCell::Missing);
        self.rows.push(row);
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<RawCell>] {
        &self.rows
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the named column, if present.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
