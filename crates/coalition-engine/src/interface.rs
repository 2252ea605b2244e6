//! Collaborator boundary: where raw features come from and where results go.
//!
//! Both traits are called strictly before or after an analysis run, never from a worker,
//! so implementations are free to block on I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{aggregate::ContributionResult, engine::RunMetadata, schema::RawTable};

/// Identifies one membership set at the provider: a team in a season.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RosterKey {
    pub team_id: String,
    pub season: String,
}

impl RosterKey {
    #[must_use]
    pub fn new(team_id: impl Into<String>, season: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            season: season.into(),
        }
    }
}

impl fmt::Display for RosterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.team_id, self.season)
    }
}

/// Supplies the raw metric table of a roster.
///
/// The table must carry a `member_id` column and one column per [`Metric`]; extra
/// columns are ignored during ingestion.
///
/// [`Metric`]: crate::schema::Metric
pub trait FeatureProvider {
    type Error: std::error::Error + Send + Sync + 'static;

    fn fetch(&self, key: &RosterKey) -> Result<RawTable, Self::Error>;
}

/// Receives the terminal output of a run.
pub trait ResultSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn accept(
        &mut self,
        results: &[ContributionResult],
        metadata: &RunMetadata,
    ) -> Result<(), Self::Error>;
}
