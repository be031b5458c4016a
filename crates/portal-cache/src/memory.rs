//! In-memory snapshot store.

use portal_core::{PortalError, Result, SnapshotStore};
use std::sync::{Mutex, PoisonError};
use tracing::trace;

/// Snapshot slot kept in memory, for testing and development.
///
/// An optional quota makes writes larger than the limit fail the way a full
/// browser storage does, which exercises the non-fatal persistence path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    payload: Mutex<Option<String>>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store rejecting payloads larger than `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self {
            payload: Mutex::new(None),
            quota: Some(quota),
        }
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<String>> {
        Ok(self
            .payload
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn write(&self, payload: &str) -> Result<()> {
        if let Some(quota) = self.quota {
            if payload.len() > quota {
                return Err(PortalError::Persistence(format!(
                    "Quota exceeded: {} bytes over a {quota} byte limit",
                    payload.len()
                )));
            }
        }
        trace!(bytes = payload.len(), "MemoryStore: storing snapshot");
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = Some(payload.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.payload.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.read().unwrap(), None);

        store.write("{\"version\":\"v1\"}").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("{\"version\":\"v1\"}"));

        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
    }

    #[test]
    fn test_memory_store_quota() {
        let store = MemoryStore::with_quota(4);
        assert!(store.write("1234").is_ok());
        let err = store.write("12345").unwrap_err();
        assert!(matches!(err, PortalError::Persistence(_)));
        // The previous payload survives a rejected write
        assert_eq!(store.read().unwrap().as_deref(), Some("1234"));
    }
}
