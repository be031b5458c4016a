//! Entry and view types exposed by the cache.

use chrono::{DateTime, Utc};
use portal_core::{CacheKey, PortalError};
use serde_json::Value;

/// Lifecycle state of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryState {
    /// Data present and inside its freshness window.
    Fresh,
    /// Data present but past its window or invalidated.
    Stale,
    /// A request for this key is in flight.
    Fetching,
    /// The last observed fetch failed.
    Error,
}

/// Point-in-time copy of one cache entry.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    /// Key of the entry.
    pub key: CacheKey,
    /// Cached payload, absent until the first successful fetch.
    pub data: Option<Value>,
    /// When the payload was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
    /// When the payload goes stale.
    pub stale_at: Option<DateTime<Utc>>,
    /// Current lifecycle state.
    pub state: EntryState,
}

/// What a consumer renders for one query.
///
/// Data and error are not exclusive: after a failed refresh the previous
/// payload is still available alongside the error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryView {
    /// Last successfully fetched payload, possibly stale.
    pub data: Option<Value>,
    /// Error of the last observed fetch, if it failed.
    pub error: Option<PortalError>,
    /// True when `data` is past its freshness window or invalidated.
    pub is_stale: bool,
    /// True while a request for this key is in flight.
    pub is_fetching: bool,
    /// When `data` was fetched.
    pub fetched_at: Option<DateTime<Utc>>,
}

impl QueryView {
    /// Returns true when there is nothing to show yet and nothing failed.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    /// Returns true when the last observed fetch failed.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
