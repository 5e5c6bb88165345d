//! Pluggable snapshot persistence.
//!
//! A [`StorageBackend`] writes immutable snapshot artifacts to a location,
//! lists what is stored, and reads an artifact back with two mandatory
//! checks before anything else sees it: the format-version check (unknown
//! future versions fail closed) and the content-hash integrity check.

pub mod git;
pub mod local;
pub mod synced;

use std::fmt;
use std::path::Path;

use serde::Deserialize;

use crate::config::StorageKind;
use crate::error::StorageError;
use crate::snapshot::{Snapshot, FORMAT_VERSION};

pub use git::GitStore;
pub use local::LocalStore;
pub use synced::SyncedStore;

/// Identifier of one stored snapshot within a backend (an artifact file
/// name for every current backend).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location(pub String);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persistence interface for snapshot artifacts.
pub trait StorageBackend: Send + Sync {
    /// Persist a snapshot, returning where it landed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend is unreachable or the write
    /// fails.
    fn write(&self, snapshot: &Snapshot) -> Result<Location, StorageError>;

    /// Read and verify a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] for an unreachable backend or
    /// missing artifact, [`StorageError::UnsupportedFormat`] for a too-new
    /// format version, and [`StorageError::Corrupt`] when the stored hash
    /// does not match the recomputed one.
    fn read(&self, location: &Location) -> Result<Snapshot, StorageError>;

    /// All stored snapshot locations, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the backend cannot be enumerated.
    fn list(&self) -> Result<Vec<Location>, StorageError>;
}

/// Open the backend of the given kind rooted at `path`.
///
/// # Errors
///
/// Returns [`StorageError`] if the backend cannot be initialised (e.g. the
/// git work tree cannot be opened or created).
pub fn open(kind: StorageKind, path: &Path) -> Result<Box<dyn StorageBackend>, StorageError> {
    match kind {
        StorageKind::Local => Ok(Box::new(LocalStore::new(path))),
        StorageKind::Synced => Ok(Box::new(SyncedStore::new(path))),
        StorageKind::Git => Ok(Box::new(GitStore::open(path)?)),
    }
}

/// Artifact file name for a snapshot: `snapshot-<timestamp>-<hash8>.json`.
#[must_use]
pub fn artifact_name(snapshot: &Snapshot) -> String {
    format!(
        "snapshot-{}-{}.json",
        snapshot.created_at.format("%Y%m%dT%H%M%SZ"),
        snapshot.short_hash()
    )
}

/// Serialize a snapshot for storage.
///
/// # Errors
///
/// Returns [`StorageError::Unreadable`] if serialization fails (a bug, but
/// never a panic).
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec_pretty(snapshot).map_err(|e| StorageError::Unreadable {
        location: artifact_name(snapshot),
        message: e.to_string(),
    })
}

/// Version probe parsed before the full artifact.
#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

/// Parse and verify a stored artifact.
///
/// Order matters: the format version is checked before the full parse so a
/// future format never produces a half-understood snapshot, and the hash is
/// verified before the snapshot is handed to any caller.
///
/// # Errors
///
/// See [`StorageBackend::read`].
pub fn decode_snapshot(location: &Location, bytes: &[u8]) -> Result<Snapshot, StorageError> {
    let probe: VersionProbe =
        serde_json::from_slice(bytes).map_err(|e| StorageError::Unreadable {
            location: location.to_string(),
            message: e.to_string(),
        })?;
    if probe.format_version > FORMAT_VERSION {
        return Err(StorageError::UnsupportedFormat {
            found: probe.format_version,
            supported: FORMAT_VERSION,
        });
    }

    let snapshot: Snapshot =
        serde_json::from_slice(bytes).map_err(|e| StorageError::Unreadable {
            location: location.to_string(),
            message: e.to_string(),
        })?;

    let computed = snapshot
        .recompute_hash()
        .map_err(|e| StorageError::Unreadable {
            location: location.to_string(),
            message: e.to_string(),
        })?;
    if computed != snapshot.content_hash {
        return Err(StorageError::Corrupt {
            location: location.to_string(),
            stored: snapshot.content_hash,
            computed,
        });
    }
    Ok(snapshot)
}
