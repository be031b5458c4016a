//! Storage slot for persisted cache snapshots.
//!
//! This module defines the [`SnapshotStore`] trait. A store holds a single
//! serialized snapshot, the way a browser's local storage holds one key.
//! Validation (version, age, allow-list) is the cache's job, not the store's,
//! so backends stay interchangeable.

use std::fmt::Debug;

use crate::error::Result;

/// Synchronous storage for one serialized cache snapshot.
///
/// Implementations report failures (quota exceeded, I/O, database errors)
/// as [`PortalError::Persistence`](crate::PortalError::Persistence); callers
/// treat those as non-fatal.
pub trait SnapshotStore: Send + Sync + Debug {
    /// Reads the stored payload.
    ///
    /// Returns `Ok(None)` if nothing has been stored.
    fn read(&self) -> Result<Option<String>>;

    /// Replaces the stored payload.
    fn write(&self, payload: &str) -> Result<()>;

    /// Removes the stored payload.
    fn clear(&self) -> Result<()>;
}
