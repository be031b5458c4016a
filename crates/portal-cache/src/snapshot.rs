//! Snapshot format and persistence rules.
//!
//! A [`PersistedSnapshot`] is the allow-listed projection of the cache. The
//! [`Persister`] owns the rules around it:
//!
//! - only keys whose leading segment is allow-listed are written
//! - writes never fail outward; a failing store just leaves the cache unpersisted
//! - on restore the `version` field is checked before anything else, and a
//!   mismatch discards the whole snapshot
//! - snapshots older than the horizon are treated as absent, and entries older
//!   than the horizon are dropped

use chrono::{DateTime, TimeDelta, Utc};
use portal_core::{CacheKey, SnapshotStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::CacheConfig;

/// One persisted cache entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedEntry {
    /// Key of the entry.
    pub key: CacheKey,
    /// Cached payload.
    pub data: Value,
    /// When the payload was fetched.
    pub fetched_at: DateTime<Utc>,
    /// When the payload goes stale.
    pub stale_at: DateTime<Utc>,
    /// Stale regardless of `stale_at`; the next read fetches again.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invalidated: bool,
}

/// Serializable projection of the persisted subset of the cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSnapshot {
    /// Cache format version that wrote the snapshot.
    pub version: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Persisted entries.
    pub entries: Vec<PersistedEntry>,
}

/// Only the version is read before committing to a full parse.
#[derive(Deserialize)]
struct VersionProbe {
    version: Option<String>,
}

/// Applies the persistence rules on top of a [`SnapshotStore`].
#[derive(Debug)]
pub struct Persister {
    store: Arc<dyn SnapshotStore>,
    version: String,
    namespaces: Vec<String>,
    max_age: Duration,
    last_generation: Mutex<u64>,
}

impl Persister {
    /// Creates a persister for `store` following `config`.
    #[must_use]
    pub fn new(store: Arc<dyn SnapshotStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            version: config.version.clone(),
            namespaces: config.persisted_namespaces.clone(),
            max_age: config.max_age,
            last_generation: Mutex::new(0),
        }
    }

    /// Returns true if entries under `key` may be persisted.
    #[must_use]
    pub fn should_persist(&self, key: &CacheKey) -> bool {
        key.namespace()
            .is_some_and(|ns| self.namespaces.iter().any(|allowed| allowed == ns))
    }

    /// Builds a snapshot from `entries`, keeping only allow-listed keys.
    pub fn snapshot<I>(&self, entries: I, saved_at: DateTime<Utc>) -> PersistedSnapshot
    where
        I: IntoIterator<Item = PersistedEntry>,
    {
        PersistedSnapshot {
            version: self.version.clone(),
            saved_at,
            entries: entries
                .into_iter()
                .filter(|entry| self.should_persist(&entry.key))
                .collect(),
        }
    }

    /// Writes `snapshot`, ignoring it if a newer generation was already written.
    ///
    /// Never fails: storage errors are logged and dropped.
    #[instrument(skip(self, snapshot), fields(entries = snapshot.entries.len()))]
    pub fn persist(&self, generation: u64, snapshot: &PersistedSnapshot) {
        let mut last = self
            .last_generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if generation <= *last {
            debug!(generation, last = *last, "Skipping outdated snapshot");
            return;
        }

        let payload = match serde_json::to_string(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize cache snapshot");
                return;
            }
        };

        match self.store.write(&payload) {
            Ok(()) => {
                *last = generation;
                debug!(bytes = payload.len(), "Persisted cache snapshot");
            }
            Err(e) => warn!(error = %e, "Cache snapshot not persisted"),
        }
    }

    /// Reads and validates the stored snapshot.
    ///
    /// Returns `None` for a missing, unreadable, mismatched-version or expired
    /// snapshot. Entries outside the allow-list or older than the horizon are
    /// dropped from a valid one.
    #[instrument(skip(self))]
    pub fn restore(&self, now: DateTime<Utc>) -> Option<PersistedSnapshot> {
        let payload = match self.store.read() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("No persisted cache snapshot");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read cache snapshot");
                return None;
            }
        };

        let probe: VersionProbe = match serde_json::from_str(&payload) {
            Ok(probe) => probe,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable cache snapshot");
                return None;
            }
        };
        if probe.version.as_deref() != Some(self.version.as_str()) {
            warn!(
                found = ?probe.version,
                expected = %self.version,
                "Discarding cache snapshot with mismatched version"
            );
            if let Err(e) = self.store.clear() {
                debug!(error = %e, "Failed to clear discarded snapshot");
            }
            return None;
        }

        let snapshot: PersistedSnapshot = match serde_json::from_str(&payload) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Discarding malformed cache snapshot");
                return None;
            }
        };

        let horizon = TimeDelta::from_std(self.max_age).unwrap_or(TimeDelta::MAX);
        let expired = |at: DateTime<Utc>| now.signed_duration_since(at) > horizon;

        if expired(snapshot.saved_at) {
            debug!(saved_at = %snapshot.saved_at, "Cache snapshot past its horizon");
            return None;
        }

        let total = snapshot.entries.len();
        let entries: Vec<_> = snapshot
            .entries
            .into_iter()
            .filter(|entry| self.should_persist(&entry.key) && !expired(entry.fetched_at))
            .collect();
        debug!(kept = entries.len(), total, "Restored cache snapshot");

        Some(PersistedSnapshot {
            entries,
            ..snapshot
        })
    }
}
