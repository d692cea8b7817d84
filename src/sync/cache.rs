//! Balance cache
//!
//! Keyed TTL store holding the last successfully fetched value for each
//! resource key. Staleness is evaluated lazily on read; nothing is swept.

use super::types::{BalanceValue, ResourceKey, ResourceType};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;

/// A cached value and when it was fetched
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ResourceKey,
    pub value: BalanceValue,
    /// Monotonic fetch time, used for TTL checks
    pub fetched_at: Instant,
    /// Wall-clock fetch time, for reporting
    pub fetched_wall: DateTime<Utc>,
}

/// Point-in-time view of one cache entry
#[derive(Debug, Clone, Serialize)]
pub struct CacheSnapshotEntry {
    pub key: String,
    pub resource: ResourceType,
    pub account_id: String,
    pub value: BalanceValue,
    pub fetched_at: DateTime<Utc>,
    pub age_ms: u64,
    pub fresh: bool,
}

/// TTL cache for balance values
///
/// All operations are synchronous; each call is atomic with respect to
/// the others.
pub struct CacheStore {
    entries: RwLock<HashMap<ResourceKey, CacheEntry>>,
    ttl: Duration,
}

impl CacheStore {
    /// Create an empty cache with the given time-to-live
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key`, regardless of age
    pub fn get(&self, key: &ResourceKey) -> Option<BalanceValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| entry.value.clone())
    }

    /// Cached value for `key` only if it is still fresh
    pub fn get_fresh(&self, key: &ResourceKey) -> Option<BalanceValue> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Store `value` under `key`, stamped with the current time
    pub fn set(&self, key: ResourceKey, value: BalanceValue) {
        let entry = CacheEntry {
            key: key.clone(),
            value,
            fetched_at: Instant::now(),
            fetched_wall: Utc::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, entry);
    }

    /// True iff an entry exists and is younger than the TTL
    pub fn is_valid(&self, key: &ResourceKey) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|entry| entry.fetched_at.elapsed() < self.ttl)
            .unwrap_or(false)
    }

    /// Remove one entry, or every entry when `key` is `None`
    pub fn clear(&self, key: Option<&ResourceKey>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match key {
            Some(key) => {
                entries.remove(key);
            }
            None => entries.clear(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All entries, stale ones included, sorted by key
    pub fn snapshot(&self) -> Vec<CacheSnapshotEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot: Vec<CacheSnapshotEntry> = entries
            .values()
            .map(|entry| {
                let age = entry.fetched_at.elapsed();
                CacheSnapshotEntry {
                    key: entry.key.to_string(),
                    resource: entry.key.resource,
                    account_id: entry.key.account_id.clone(),
                    value: entry.value.clone(),
                    fetched_at: entry.fetched_wall,
                    age_ms: age.as_millis() as u64,
                    fresh: age < self.ttl,
                }
            })
            .collect();
        snapshot.sort_by(|a, b| a.key.cmp(&b.key));
        snapshot
    }
}
