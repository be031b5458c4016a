//! File-backed snapshot store.

use portal_core::{PortalError, Result, SnapshotStore};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Snapshot slot stored as a JSON file.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Create a store writing to `path`.
    ///
    /// The file and its parent directories are created on first write.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Returns the snapshot file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "snapshot".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for FileStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(payload) => Ok(Some(payload)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortalError::Persistence(e.to_string())),
        }
    }

    #[instrument(skip(self, payload), fields(path = %self.path.display(), bytes = payload.len()))]
    fn write(&self, payload: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PortalError::Persistence(e.to_string()))?;
        }

        let temp = self.temp_path();
        fs::write(&temp, payload).map_err(|e| PortalError::Persistence(e.to_string()))?;
        fs::rename(&temp, &self.path).map_err(|e| PortalError::Persistence(e.to_string()))?;
        debug!("Wrote snapshot file");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortalError::Persistence(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested").join("cache.json"));

        assert_eq!(store.read().unwrap(), None);
        store.write("{\"version\":\"v1\"}").unwrap();
        assert_eq!(store.read().unwrap().as_deref(), Some("{\"version\":\"v1\"}"));
        assert!(!store.temp_path().exists());

        store.clear().unwrap();
        assert_eq!(store.read().unwrap(), None);
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_unwritable_location() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "x").unwrap();

        let store = FileStore::new(blocker.join("cache.json"));
        assert!(matches!(
            store.write("{}"),
            Err(PortalError::Persistence(_))
        ));
    }
}
