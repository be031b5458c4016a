//! Portal configuration.

use portal_cache::{CacheConfig, FileStore, NoopStore};
use portal_core::{PortalError, Result, SnapshotStore};
use portal_http::{ClientConfig, DEFAULT_TIMEOUT, FileSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Backend base URL (required).
pub const ENV_API_URL: &str = "PORTAL_API_URL";
/// Request timeout in seconds.
pub const ENV_REQUEST_TIMEOUT: &str = "PORTAL_REQUEST_TIMEOUT_SECS";
/// Path of the JSON session record.
pub const ENV_SESSION_FILE: &str = "PORTAL_SESSION_FILE";
/// Path of the cache snapshot (`.db`/`.sqlite` selects SQLite).
pub const ENV_CACHE_FILE: &str = "PORTAL_CACHE_FILE";
/// Enables prefetch diagnostics when `1`/`true`/`yes`/`on`.
pub const ENV_DIAGNOSTICS: &str = "PORTAL_DIAGNOSTICS";

/// Everything needed to build a [`Portal`](crate::Portal).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortalConfig {
    /// Backend base URL.
    pub api_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Session record file; requests are anonymous without it.
    pub session_file: Option<PathBuf>,
    /// Snapshot location; the cache is memory-only without it.
    pub cache_file: Option<PathBuf>,
    /// Log swallowed prefetch failures.
    pub diagnostics: bool,
    /// Cache settings.
    pub cache: CacheConfig,
}

impl PortalConfig {
    /// Creates a configuration for `api_url` with defaults elsewhere.
    #[must_use]
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            timeout: DEFAULT_TIMEOUT,
            session_file: None,
            cache_file: None,
            diagnostics: false,
            cache: CacheConfig::default(),
        }
    }

    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    /// See [`from_lookup`](Self::from_lookup).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    /// Returns [`PortalError::InvalidParameter`] if `PORTAL_API_URL` is missing
    /// or a value cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_url = get(ENV_API_URL)
            .ok_or_else(|| PortalError::InvalidParameter(format!("{ENV_API_URL} is not set")))?;
        let mut config = Self::new(api_url);

        if let Some(secs) = get(ENV_REQUEST_TIMEOUT) {
            let secs: u64 = secs.parse().map_err(|_| {
                PortalError::InvalidParameter(format!("{ENV_REQUEST_TIMEOUT}: not a number: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }
        config.session_file = get(ENV_SESSION_FILE).map(PathBuf::from);
        config.cache_file = get(ENV_CACHE_FILE).map(PathBuf::from);
        config.diagnostics = get(ENV_DIAGNOSTICS)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"));

        debug!(api_url = %config.api_url, "Loaded portal configuration");
        Ok(config)
    }

    /// Sets the session record file.
    #[must_use]
    pub fn with_session_file(mut self, path: impl AsRef<Path>) -> Self {
        self.session_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the snapshot location.
    #[must_use]
    pub fn with_cache_file(mut self, path: impl AsRef<Path>) -> Self {
        self.cache_file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Sets the cache settings.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Enables or disables prefetch diagnostics.
    #[must_use]
    pub const fn with_diagnostics(mut self, diagnostics: bool) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Builds the HTTP client configuration.
    #[must_use]
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.api_url).with_timeout(self.timeout);
        match &self.session_file {
            Some(path) => config.with_session(Arc::new(FileSession::new(path))),
            None => config,
        }
    }

    /// Opens the snapshot store.
    ///
    /// # Errors
    /// Returns an error if a SQLite database cannot be opened.
    pub fn snapshot_store(&self) -> Result<Arc<dyn SnapshotStore>> {
        let Some(path) = &self.cache_file else {
            return Ok(Arc::new(NoopStore::new()));
        };

        #[cfg(feature = "cache-sqlite")]
        if is_sqlite_path(path) {
            return Ok(Arc::new(portal_cache::SqliteStore::new(path)?));
        }

        Ok(Arc::new(FileStore::new(path)))
    }
}

#[cfg_attr(not(feature = "cache-sqlite"), allow(dead_code))]
fn is_sqlite_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "db" | "sqlite" | "sqlite3"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_from_lookup() {
        let config = PortalConfig::from_lookup(lookup(&[
            (ENV_API_URL, "https://portal.example/api"),
            (ENV_REQUEST_TIMEOUT, "10"),
            (ENV_SESSION_FILE, "/tmp/session.json"),
            (ENV_DIAGNOSTICS, "True"),
        ]))
        .unwrap();

        assert_eq!(config.api_url, "https://portal.example/api");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.json")));
        assert_eq!(config.cache_file, None);
        assert!(config.diagnostics);
    }

    #[test]
    fn test_defaults_and_errors() {
        let config =
            PortalConfig::from_lookup(lookup(&[(ENV_API_URL, "http://localhost:8000")])).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.diagnostics);

        assert!(matches!(
            PortalConfig::from_lookup(lookup(&[])),
            Err(PortalError::InvalidParameter(_))
        ));
        assert!(matches!(
            PortalConfig::from_lookup(lookup(&[(ENV_API_URL, "  ")])),
            Err(PortalError::InvalidParameter(_))
        ));
        assert!(matches!(
            PortalConfig::from_lookup(lookup(&[
                (ENV_API_URL, "http://localhost"),
                (ENV_REQUEST_TIMEOUT, "soon"),
            ])),
            Err(PortalError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_snapshot_store_selection() {
        assert!(is_sqlite_path(Path::new("cache.db")));
        assert!(is_sqlite_path(Path::new("cache.SQLITE")));
        assert!(!is_sqlite_path(Path::new("cache.json")));

        let dir = tempfile::tempdir().unwrap();
        let config = PortalConfig::new("http://localhost").with_cache_file(dir.path().join("cache.json"));
        let store = config.snapshot_store().unwrap();
        store.write("{}").unwrap();
        assert!(dir.path().join("cache.json").exists());

        let memory_only = PortalConfig::new("http://localhost").snapshot_store().unwrap();
        memory_only.write("{}").unwrap();
        assert_eq!(memory_only.read().unwrap(), None);
    }
}
