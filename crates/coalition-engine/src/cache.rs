//! Memoization of coalition values.
//!
//! [`MemoCache`] maps a canonical [`Coalition`] to its previously computed `v(S)`. One
//! cache lives for one analysis run and is shared by reference with every worker. Reads
//! are concurrent; writes are idempotent because a value is a pure function of its key,
//! so two workers racing on the same coalition store the same number and last write wins.
//!
//! Values can optionally outlive the run through a [`CoalitionStore`], keyed by
//! `(membership_set_id, coalition_key)`. The store is only touched before workers start
//! and after they finish, never from inside a worker.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::coalition::Coalition;

/// Default maximum number of cached coalitions.
pub const DEFAULT_CACHE_CAPACITY: usize = 1 << 20;

/// Hit/miss counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Run-scoped cache of coalition values.
#[derive(Debug)]
pub struct MemoCache {
    values: DashMap<Coalition, f64>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for MemoCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoCache {
    /// Creates a cache holding at most `capacity` coalitions.
    ///
    /// Once full, new values are still computed but no longer stored.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            values: DashMap::new(),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Looks up a coalition, counting the hit or miss.
    pub fn get(&self, coalition: &Coalition) -> Option<f64> {
        let value = self.values.get(coalition).map(|entry| *entry);
        let counter = if value.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Stores a value unless the cache is full.
    pub fn insert(&self, coalition: Coalition, value: f64) {
        if self.values.len() < self.capacity {
            self.values.insert(coalition, value);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.values.len(),
        }
    }

    /// Seeds the cache with persisted values for a set of `n` members.
    ///
    /// Entries whose key does not parse for this set size, or whose value is not
    /// finite, are skipped. Returns the number of entries loaded.
    pub fn preload(&self, n: usize, stored: &[StoredValue]) -> usize {
        let mut loaded = 0;
        for entry in stored {
            let Some(coalition) = Coalition::from_key(n, &entry.key) else {
                continue;
            };
            if entry.value.is_finite() {
                self.insert(coalition, entry.value);
                loaded += 1;
            }
        }
        loaded
    }

    /// All cached values, ordered by key for stable persistence.
    #[must_use]
    pub fn to_stored(&self) -> Vec<StoredValue> {
        let mut stored = self
            .values
            .iter()
            .map(|entry| StoredValue {
                key: entry.key().key(),
                value: *entry.value(),
            })
            .collect::<Vec<_>>();
        stored.sort_by(|a, b| a.key.len().cmp(&b.key.len()).then_with(|| a.key.cmp(&b.key)));
        stored
    }
}

/// One persisted coalition value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredValue {
    /// Hex bitset key, see [`Coalition::key`].
    pub key: String,
    pub value: f64,
}

/// External persistence for coalition values across runs.
pub trait CoalitionStore {
    type Error: std::error::Error;

    /// Loads values previously saved for a membership set (empty if none).
    fn load(&self, set_id: &str) -> Result<Vec<StoredValue>, Self::Error>;

    /// Saves the values of a finished run for a membership set.
    fn save(&self, set_id: &str, values: &[StoredValue]) -> Result<(), Self::Error>;
}
