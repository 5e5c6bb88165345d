//! Plain-directory storage backend.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::snapshot::Snapshot;

use super::{artifact_name, decode_snapshot, encode_snapshot, Location, StorageBackend};

/// Stores snapshot artifacts as files in a single directory.
///
/// Writes go through a temporary file and an atomic rename so a crash never
/// leaves a half-written artifact under a valid name.
#[derive(Debug)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `dir`. The directory is created on first
    /// write, not here, so read-only use of an absent store fails with a
    /// clear unavailable error instead of a surprise mkdir.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory this store writes into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StorageBackend for LocalStore {
    fn write(&self, snapshot: &Snapshot) -> Result<Location, StorageError> {
        fs::create_dir_all(&self.dir).map_err(|source| StorageError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let name = artifact_name(snapshot);
        let bytes = encode_snapshot(snapshot)?;
        let tmp = self.dir.join(format!(".{name}.tmp"));
        let target = self.dir.join(&name);
        fs::write(&tmp, &bytes).map_err(|source| StorageError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &target).map_err(|source| StorageError::Io {
            path: target.clone(),
            source,
        })?;
        Ok(Location(name))
    }

    fn read(&self, location: &Location) -> Result<Snapshot, StorageError> {
        let path = self.dir.join(&location.0);
        let bytes = fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::Unavailable(format!("no snapshot at {}", path.display()))
            } else {
                StorageError::Io { path: path.clone(), source: e }
            }
        })?;
        decode_snapshot(location, &bytes)
    }

    fn list(&self) -> Result<Vec<Location>, StorageError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        let mut locations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with("snapshot-") && name.ends_with(".json") {
                locations.push(Location(name));
            }
        }
        // Timestamped names sort chronologically.
        locations.sort();
        Ok(locations)
    }
}
