//! SQLite-backed snapshot store.

use chrono::Utc;
use portal_core::{PortalError, Result, SnapshotStore};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument};

/// Slot name used when none is given.
const DEFAULT_SLOT: &str = "portal-cache";

/// Snapshot slot stored in a SQLite database.
///
/// An embedded-database alternative to [`FileStore`](crate::FileStore). Several
/// slots can share one database file; each store instance owns one slot.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    slot: String,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation fails.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| PortalError::Persistence(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| PortalError::Persistence(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Use `slot` instead of the default slot name.
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<String>) -> Self {
        self.slot = slot.into();
        self
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            slot: DEFAULT_SLOT.to_string(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// A panic while holding the connection leaves it usable, so poisoning is
    /// ignored.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize the database schema.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS cache_snapshot (
                slot TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                written_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| PortalError::Persistence(e.to_string()))?;

        debug!("SQLite snapshot schema initialized");
        Ok(())
    }
}

impl SnapshotStore for SqliteStore {
    #[instrument(skip(self), fields(slot = %self.slot))]
    fn read(&self) -> Result<Option<String>> {
        let conn = self.conn();

        conn.query_row(
            "SELECT payload FROM cache_snapshot WHERE slot = ?1",
            params![self.slot],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| PortalError::Persistence(e.to_string()))
    }

    #[instrument(skip(self, payload), fields(slot = %self.slot, bytes = payload.len()))]
    fn write(&self, payload: &str) -> Result<()> {
        let written_at = Utc::now().to_rfc3339();
        let conn = self.conn();

        conn.execute(
            "INSERT OR REPLACE INTO cache_snapshot (slot, payload, written_at)
             VALUES (?1, ?2, ?3)",
            params![self.slot, payload, written_at],
        )
        .map_err(|e| PortalError::Persistence(e.to_string()))?;

        debug!("Stored snapshot");
        Ok(())
    }

    #[instrument(skip(self), fields(slot = %self.slot))]
    fn clear(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "DELETE FROM cache_snapshot WHERE slot = ?1",
            params![self.slot],
        )
        .map_err(|e| PortalError::Persistence(e.to_string()))?;

        debug!("Cleared snapshot");
        Ok(())
    }
}
