//! JSON-file persistence of coalition values between CLI runs.
//!
//! A stored value is only valid for the value function that produced it, so the file
//! records the value weights and, per membership set, a fingerprint of the roster's ids
//! and raw metrics. Entries written under different weights or for a roster whose stats
//! have changed are ignored on load.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use coalition_engine::{CoalitionStore, MembershipSet, StoredValue, ValueWeights};
use serde::{Deserialize, Serialize};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StoreError {
    #[display("failed to access coalition cache file {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("failed to parse coalition cache file {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    weights: ValueWeights,
    sets: BTreeMap<String, StoredSet>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSet {
    fingerprint: String,
    values: Vec<StoredValue>,
}

/// Coalition store backed by one JSON file.
#[derive(Debug, Clone)]
pub struct JsonCoalitionStore {
    path: PathBuf,
    weights: ValueWeights,
    fingerprint: String,
}

impl JsonCoalitionStore {
    pub fn new(path: impl Into<PathBuf>, weights: ValueWeights, set: &MembershipSet) -> Self {
        Self {
            path: path.into(),
            weights,
            fingerprint: roster_fingerprint(set),
        }
    }

    /// Reads the file, returning `None` if it does not exist.
    fn read(&self) -> Result<Option<CacheFile>, StoreError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| StoreError::Json {
                path: self.path.clone(),
                source,
            })
    }

    fn write(&self, file: &CacheFile) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string(file).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        let tmp = tmp_path(&self.path);
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)
    }
}

/// Hex digest of the member ids and the exact bits of every raw metric.
fn roster_fingerprint(set: &MembershipSet) -> String {
    let mut hasher = blake3::Hasher::new();
    for member in set.members() {
        let id = member.id().0.as_bytes();
        hasher.update(&(id.len() as u64).to_le_bytes());
        hasher.update(id);
        for value in member.metrics() {
            hasher.update(&value.to_bits().to_le_bytes());
        }
    }
    hasher.finalize().to_hex().to_string()
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_owned();
    name.push(".tmp");
    path.with_file_name(name)
}

impl CoalitionStore for JsonCoalitionStore {
    type Error = StoreError;

    fn load(&self, set_id: &str) -> Result<Vec<StoredValue>, Self::Error> {
        let Some(file) = self.read()? else {
            return Ok(vec![]);
        };
        if file.weights != self.weights {
            tracing::info!(
                path = %self.path.display(),
                "value weights changed, ignoring coalition cache"
            );
            return Ok(vec![]);
        }
        match file.sets.get(set_id) {
            Some(set) if set.fingerprint == self.fingerprint => Ok(set.values.clone()),
            Some(_) => {
                tracing::info!(set = set_id, "roster data changed, ignoring cached coalitions");
                Ok(vec![])
            }
            None => Ok(vec![]),
        }
    }

    fn save(&self, set_id: &str, values: &[StoredValue]) -> Result<(), Self::Error> {
        // other sets survive only if they were computed under the same weights
        let mut file = match self.read() {
            Ok(Some(file)) if file.weights == self.weights => file,
            Ok(_) | Err(StoreError::Json { .. }) => CacheFile {
                weights: self.weights,
                sets: BTreeMap::new(),
            },
            Err(err) => return Err(err),
        };
        file.sets.insert(
            set_id.to_owned(),
            StoredSet {
                fingerprint: self.fingerprint.clone(),
                values: values.to_vec(),
            },
        );
        self.write(&file)
    }
}
