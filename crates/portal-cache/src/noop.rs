//! No-op snapshot store.

use portal_core::{Result, SnapshotStore};
use tracing::trace;

/// A store that never keeps anything.
///
/// `read` always returns `Ok(None)` and `write` always succeeds. Useful for
/// running the cache purely in memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStore;

impl NoopStore {
    /// Create a new no-op store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl SnapshotStore for NoopStore {
    fn read(&self) -> Result<Option<String>> {
        trace!("NoopStore: read called, returning None");
        Ok(None)
    }

    fn write(&self, _payload: &str) -> Result<()> {
        trace!("NoopStore: write called, doing nothing");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        trace!("NoopStore: clear called, doing nothing");
        Ok(())
    }
}
