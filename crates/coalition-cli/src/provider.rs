//! File-backed feature provider.
//!
//! A roster `team/season` lives in `<data-dir>/<team>_<season>.json` (an array of
//! objects, one per member) or `<data-dir>/<team>_<season>.csv` (header row plus one
//! row per member). The JSON file wins when both exist.

use std::{
    fs::File,
    io::{self, BufReader},
    path::{Path, PathBuf},
};

use coalition_engine::{
    FeatureProvider, RosterKey,
    schema::{MEMBER_ID_COLUMN, RawCell, RawTable},
};
use serde_json::{Map, Value};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ProviderError {
    #[display(
        "no feature file for roster {key} in {} (expected {key_stem}.json or {key_stem}.csv)",
        dir.display()
    )]
    NotFound {
        key: RosterKey,
        dir: PathBuf,
        key_stem: String,
    },
    #[display("failed to read {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("failed to parse JSON feature file {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("failed to parse CSV feature file {}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[display("JSON feature file {} must be an array of objects", path.display())]
    Shape { path: PathBuf },
}

/// Reads roster tables from a data directory.
#[derive(Debug, Clone)]
pub struct FileFeatureProvider {
    data_dir: PathBuf,
}

impl FileFeatureProvider {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn stem(key: &RosterKey) -> String {
        format!("{}_{}", key.team_id, key.season)
    }
}

impl FeatureProvider for FileFeatureProvider {
    type Error = ProviderError;

    fn fetch(&self, key: &RosterKey) -> Result<RawTable, Self::Error> {
        let stem = Self::stem(key);
        let json_path = self.data_dir.join(format!("{stem}.json"));
        if json_path.is_file() {
            tracing::debug!(path = %json_path.display(), "reading JSON roster");
            return read_json_table(&json_path);
        }
        let csv_path = self.data_dir.join(format!("{stem}.csv"));
        if csv_path.is_file() {
            tracing::debug!(path = %csv_path.display(), "reading CSV roster");
            return read_csv_table(&csv_path);
        }
        Err(ProviderError::NotFound {
            key: key.clone(),
            dir: self.data_dir.clone(),
            key_stem: stem,
        })
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ProviderError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| ProviderError::Io {
            path: path.to_owned(),
            source,
        })
}

fn read_json_table(path: &Path) -> Result<RawTable, ProviderError> {
    let value: Value = serde_json::from_reader(open(path)?).map_err(|source| ProviderError::Json {
        path: path.to_owned(),
        source,
    })?;
    let shape_error = || ProviderError::Shape {
        path: path.to_owned(),
    };
    let records = value
        .as_array()
        .ok_or_else(shape_error)?
        .iter()
        .map(|record| record.as_object().ok_or_else(shape_error))
        .collect::<Result<Vec<&Map<String, Value>>, _>>()?;

    // header is the union of keys, in first-seen order
    let mut columns: Vec<String> = vec![];
    for record in &records {
        for name in record.keys() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }

    let mut table = RawTable::new(columns.iter().map(String::as_str));
    for record in &records {
        let row = columns
            .iter()
            .map(|name| match record.get(name) {
                Some(value) => json_cell(name, value),
                None => RawCell::Missing,
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

fn json_cell(column: &str, value: &Value) -> RawCell {
    match value {
        Value::Null => RawCell::Missing,
        Value::Number(n) if column == MEMBER_ID_COLUMN => RawCell::Text(n.to_string()),
        Value::Number(n) => n.as_f64().map_or(RawCell::Missing, RawCell::Number),
        Value::String(s) if column == MEMBER_ID_COLUMN => RawCell::Text(s.clone()),
        Value::String(s) => RawCell::parse(s),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => RawCell::Text(value.to_string()),
    }
}

fn read_csv_table(path: &Path) -> Result<RawTable, ProviderError> {
    let csv_error = |source| ProviderError::Csv {
        path: path.to_owned(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(open(path)?);
    let headers = reader.headers().map_err(csv_error)?.clone();
    let id_col = headers.iter().position(|h| h == MEMBER_ID_COLUMN);

    let mut table = RawTable::new(headers.iter());
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row = record
            .iter()
            .enumerate()
            .map(|(i, field)| {
                if Some(i) == id_col {
                    if field.is_empty() {
                        RawCell::Missing
                    } else {
                        RawCell::Text(field.to_owned())
                    }
                } else {
                    RawCell::parse(field)
                }
            })
            .collect();
        table.push_row(row);
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use coalition_engine::{EngineError, MembershipSet, schema::Metric};

    use super::*;

    fn header() -> String {
        std::iter::once(MEMBER_ID_COLUMN)
            .chain(Metric::ALL.iter().map(|m| m.column()))
            .collect::<Vec<_>>()
            .join(",")
    }

    #[test]
    fn test_reads_csv_roster() {
        let dir = tempfile::tempdir().unwrap();
        let csv = format!(
            "{}\n{}\n{}\n",
            header(),
            "saka,2700,14,11,12.1,9.0,40,20,5,3,1400,60,80",
            "007,900,1,,0.5,0.2,10,5,2,1,300,5,9",
        );
        fs::write(dir.path().join("ars_2023.csv"), csv).unwrap();

        let table = FileFeatureProvider::new(dir.path())
            .fetch(&RosterKey::new("ars", "2023"))
            .unwrap();
        assert_eq!(table.rows().len(), 2);
        let set = MembershipSet::from_table("ars/2023", &table).unwrap();
        // ids stay textual, so leading zeros survive
        assert_eq!(set.members()[0].id().0, "007");
        assert_eq!(set.members()[0].metric(Metric::Assists), 0.0);
        assert_eq!(set.members()[1].metric(Metric::Goals), 14.0);
    }

    #[test]
    fn test_prefers_json_and_unions_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ars_2023.csv"), "garbage").unwrap();
        let json = r#"[
            {"member_id": "a", "goals": 2, "minutes_played": "90"},
            {"member_id": "b", "assists": 1, "extra": "ignored"}
        ]"#;
        fs::write(dir.path().join("ars_2023.json"), json).unwrap();

        let table = FileFeatureProvider::new(dir.path())
            .fetch(&RosterKey::new("ars", "2023"))
            .unwrap();
        assert_eq!(
            table.columns().to_vec(),
            vec!["goals", "member_id", "minutes_played", "assists", "extra"]
        );
        assert_eq!(table.rows()[0][2], RawCell::Number(90.0));
        assert_eq!(table.rows()[1][0], RawCell::Missing);
        // required metric columns are missing, so ingestion rejects it
        let err = MembershipSet::from_table("s", &table).unwrap_err();
        assert!(matches!(err, EngineError::InvalidFeatureData { .. }));
    }

    #[test]
    fn test_boolean_cell_is_rejected_at_ingestion() {
        let mut fields = Metric::ALL
            .iter()
            .map(|m| format!("\"{}\": 1", m.column()))
            .collect::<Vec<_>>();
        fields[1] = "\"goals\": true".to_owned();
        let json = format!("[{{\"member_id\": 9, {}}}]", fields.join(", "));
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t_s.json"), json).unwrap();

        let table = FileFeatureProvider::new(dir.path())
            .fetch(&RosterKey::new("t", "s"))
            .unwrap();
        let err = MembershipSet::from_table("t/s", &table).unwrap_err();
        match err {
            EngineError::InvalidFeatureData { column, row, .. } => {
                assert_eq!(column, "goals");
                assert_eq!(row.as_deref(), Some("9"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_missing_roster() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileFeatureProvider::new(dir.path())
            .fetch(&RosterKey::new("x", "1999"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotFound { .. }));
        assert!(err.to_string().contains("x_1999.json"));
    }

    #[test]
    fn test_non_array_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x_1.json"), r#"{"member_id": "a"}"#).unwrap();
        let err = FileFeatureProvider::new(dir.path())
            .fetch(&RosterKey::new("x", "1"))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Shape { .. }));
    }
}
