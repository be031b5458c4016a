//! Cache configuration.

use portal_core::FreshnessWindows;
use std::time::Duration;

/// Snapshot format version written by this build.
///
/// Bump it whenever the shape of cached payloads changes; snapshots written
/// under another version are discarded whole on restore.
pub const CACHE_FORMAT_VERSION: &str = "portal-cache-v1";

/// Leading key segments whose entries are persisted by default.
pub const DEFAULT_PERSISTED_NAMESPACES: &[&str] = &["logements", "immeubles", "parc", "gestion-parc"];

/// Default persistence horizon.
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Default delay before the single read retry.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Configuration of a [`QueryCache`](crate::QueryCache).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Expected snapshot format version.
    pub version: String,
    /// Leading key segments eligible for persistence.
    pub persisted_namespaces: Vec<String>,
    /// Snapshots and entries older than this are ignored on restore.
    pub max_age: Duration,
    /// Rolling windows for non-batch query families.
    pub windows: FreshnessWindows,
    /// Retries after a failed read (mutations never retry).
    pub query_retries: u32,
    /// Delay before each read retry.
    pub retry_delay: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: CACHE_FORMAT_VERSION.to_string(),
            persisted_namespaces: DEFAULT_PERSISTED_NAMESPACES
                .iter()
                .map(|ns| (*ns).to_string())
                .collect(),
            max_age: DEFAULT_MAX_AGE,
            windows: FreshnessWindows::default(),
            query_retries: 1,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl CacheConfig {
    /// Create a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the expected snapshot format version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Replaces the persisted namespace allow-list.
    #[must_use]
    pub fn with_persisted_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.persisted_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the persistence horizon.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Sets the rolling freshness windows.
    #[must_use]
    pub const fn with_windows(mut self, windows: FreshnessWindows) -> Self {
        self.windows = windows;
        self
    }

    /// Sets the read retry count and delay.
    #[must_use]
    pub const fn with_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.query_retries = retries;
        self.retry_delay = delay;
        self
    }
}
