#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cached data access for the metering portal.
//!
//! This crate re-exports the core types and the cache, HTTP and series
//! crates, and provides the [`Portal`] service that ties them together.
//!
//! # Features
//!
//! - `cache-sqlite` - SQLite snapshot store, selected for `.db`/`.sqlite`
//!   cache files
//!
//! # Example
//!
//! ```no_run
//! use portal::{Portal, PortalConfig, Resource};
//!
//! #[tokio::main]
//! async fn main() -> portal::Result<()> {
//!     let portal = Portal::from_config(&PortalConfig::from_env()?)?;
//!
//!     let view = portal.load(Resource::Parc).await;
//!     if let Some(error) = &view.error {
//!         eprintln!("{}", portal::handle_api_error(error));
//!     }
//!     println!("{:?}", view.data);
//!
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use portal_core::*;

// Cache
#[cfg(feature = "cache-sqlite")]
pub use portal_cache::SqliteStore;
pub use portal_cache::{
    CacheConfig, CacheEntry, EntryState, FileStore, MemoryStore, NoopStore, QueryCache, QueryView,
};

// Backend
pub use portal_http::{
    ApiClient, ClientConfig, Download, FileSession, HttpPortalApi, Session, SessionSource,
    StaticSession,
};

// Consumption series
pub use portal_series::{
    AlignedSeries, ConsumptionPoint, ConsumptionSeries, ObjectShape, SeriesDecoder,
    SeriesPresence, align,
};

mod config;
mod prefetch;
mod resource;
mod service;
mod view;

#[cfg(test)]
mod testing;

pub use config::{
    ENV_API_URL, ENV_CACHE_FILE, ENV_DIAGNOSTICS, ENV_REQUEST_TIMEOUT, ENV_SESSION_FILE,
    PortalConfig,
};
pub use prefetch::{PrefetchScope, Prefetcher};
pub use resource::{IMMEUBLE_FIELDS, Resource};
pub use service::Portal;
pub use view::{ChartBody, ChartView, split_years};
