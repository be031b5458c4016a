#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the metering portal data layer.
//!
//! This crate provides the foundational abstractions shared by the cache,
//! HTTP and decoder crates:
//!
//! - [`PortalApi`](api::PortalApi) - Backend seam for every cached resource
//! - [`SnapshotStore`](store::SnapshotStore) - Storage slot for cache snapshots
//! - [`CacheKey`](key::CacheKey) - Structural, normalized cache keys
//! - [`Query`](freshness::Query) - Cache key plus freshness policy
//! - [`Clock`](clock::Clock) - Time source with local-midnight arithmetic

/// Backend API trait.
pub mod api;
/// Time sources.
pub mod clock;
/// Error types for portal operations.
pub mod error;
/// Declarative normalization of backend records.
pub mod fields;
/// Freshness policies and query descriptors.
pub mod freshness;
/// Cache keys.
pub mod key;
/// Snapshot storage trait.
pub mod store;

// Re-export commonly used items at crate root
pub use api::PortalApi;
pub use clock::{Clock, ManualClock, SystemClock, next_midnight_in};
pub use error::{FALLBACK_MESSAGE, PortalError, Result, handle_api_error};
pub use fields::{FieldMap, pick, pick_str};
pub use freshness::{Freshness, FreshnessWindows, Query, QueryFamily};
pub use key::{CacheKey, KeySegment};
pub use store::SnapshotStore;
