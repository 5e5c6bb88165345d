//! Cloud-synced directory storage backend.

use std::fs;
use std::path::PathBuf;

use crate::error::StorageError;
use crate::snapshot::Snapshot;

use super::{LocalStore, Location, StorageBackend};

/// Wraps a [`LocalStore`] rooted inside a cloud-synced directory (iCloud
/// Drive, Dropbox, Syncthing).
///
/// The sync client owns propagation; this backend only refuses to operate
/// while the directory is visibly mid-sync, because a half-propagated
/// artifact would otherwise read as corrupt. Placeholder and conflict
/// markers left by sync clients are the readiness signal.
#[derive(Debug)]
pub struct SyncedStore {
    inner: LocalStore,
}

/// File-name fragments that mark an artifact as still propagating or in
/// conflict with another machine's copy.
const SYNC_MARKERS: &[&str] = &[".icloud", ".sync-conflict", "conflicted copy"];

impl SyncedStore {
    /// Create a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: LocalStore::new(dir),
        }
    }

    /// Fail with [`StorageError::Unavailable`] while any snapshot artifact
    /// in the directory carries a sync marker.
    fn check_ready(&self) -> Result<(), StorageError> {
        let entries = match fs::read_dir(self.inner.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.inner.dir().to_path_buf(),
                    source,
                })
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            if SYNC_MARKERS.iter().any(|m| name.contains(m)) {
                return Err(StorageError::Unavailable(format!(
                    "sync in progress: {} has not finished propagating",
                    name
                )));
            }
        }
        Ok(())
    }
}

impl StorageBackend for SyncedStore {
    fn write(&self, snapshot: &Snapshot) -> Result<Location, StorageError> {
        self.check_ready()?;
        self.inner.write(snapshot)
    }

    fn read(&self, location: &Location) -> Result<Snapshot, StorageError> {
        self.check_ready()?;
        self.inner.read(location)
    }

    fn list(&self) -> Result<Vec<Location>, StorageError> {
        self.check_ready()?;
        self.inner.list()
    }
}
