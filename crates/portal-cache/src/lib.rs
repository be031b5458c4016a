#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Query cache and snapshot persistence for the metering portal.
//!
//! This crate provides the [`QueryCache`] service and implementations of the
//! [`SnapshotStore`] trait from `portal-core`:
//!
//! - [`FileStore`] - JSON file on disk
//! - [`SqliteStore`] - SQLite slot (default, requires `sqlite` feature)
//! - [`MemoryStore`] - In-memory slot with an optional quota, for testing
//! - [`NoopStore`] - Store that never keeps anything

/// Cache configuration.
pub mod config;
/// Entry and view types exposed by the cache.
pub mod entry;
/// File-backed snapshot store.
pub mod file;
/// In-memory snapshot store.
pub mod memory;
/// No-op snapshot store.
pub mod noop;
/// The query cache service.
pub mod query;
/// Snapshot format and persistence rules.
pub mod snapshot;

/// SQLite-backed snapshot store.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use portal_core::SnapshotStore;

pub use config::{CACHE_FORMAT_VERSION, CacheConfig, DEFAULT_PERSISTED_NAMESPACES};
pub use entry::{CacheEntry, EntryState, QueryView};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use noop::NoopStore;
pub use query::QueryCache;
pub use snapshot::{PersistedEntry, PersistedSnapshot, Persister};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
