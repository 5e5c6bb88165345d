//! Domain-specific error types for the backup/restore engine.
//!
//! This module provides a structured error hierarchy using [`thiserror`].
//! Internal modules return typed errors (e.g., [`BuildError`],
//! [`StorageError`]) while command handlers at the CLI boundary convert them
//! to [`anyhow::Error`] via the standard `?` operator.
//!
//! # Error hierarchy
//!
//! ```text
//! RebuildError
//! ├── Build(BuildError)     — snapshot assembly (duplicate domains/items)
//! ├── Storage(StorageError) — unreachable backends, corrupt or unsupported artifacts
//! ├── Plan(PlanError)       — restore planning
//! └── Journal(JournalError) — resumability log I/O and replay
//! ```
//!
//! Domain-local failures during collection never surface here: collectors
//! degrade to partial records plus warnings by contract.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for the backup/restore engine.
///
/// Aggregates domain-specific sub-errors and is convertible to
/// [`anyhow::Error`] for use at CLI command boundaries.
#[derive(Error, Debug)]
pub enum RebuildError {
    /// Snapshot assembly error (duplicate domain or item identity).
    #[error("snapshot build error: {0}")]
    Build(#[from] BuildError),

    /// Storage backend error (unavailable, corrupt, or unsupported artifact).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Restore planning error.
    #[error("restore planning error: {0}")]
    Plan(#[from] PlanError),

    /// Resumability journal error.
    #[error("restore journal error: {0}")]
    Journal(#[from] JournalError),
}

/// Errors that abort a backup before any artifact is produced.
#[derive(Error, Debug)]
pub enum BuildError {
    /// Two domain records claim the same domain name.
    #[error("duplicate domain record '{0}'")]
    DuplicateDomain(String),

    /// Two items within one domain share an identity.
    #[error("duplicate item '{item}' in domain '{domain}'")]
    DuplicateItem {
        /// Domain containing the collision.
        domain: String,
        /// The colliding item identity.
        item: String,
    },

    /// The canonical serialization failed.
    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by storage backends.
///
/// `Corrupt` and `UnsupportedFormat` are fatal to a restore: the integrity
/// and version checks run before any action is planned or applied.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend cannot be reached (missing directory, failed fetch,
    /// sync client still propagating).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The stored hash does not match the recomputed content hash.
    #[error("corrupt snapshot at {location}: stored hash {stored} != computed {computed}")]
    Corrupt {
        /// Where the artifact was read from.
        location: String,
        /// Hash recorded inside the artifact.
        stored: String,
        /// Hash recomputed over the canonical content.
        computed: String,
    },

    /// The artifact declares a format version newer than this binary understands.
    #[error("unsupported snapshot format version {found} (max supported {supported})")]
    UnsupportedFormat {
        /// Version found in the artifact.
        found: u32,
        /// Highest version this binary can parse.
        supported: u32,
    },

    /// The artifact is not parseable at all.
    #[error("unreadable snapshot at {location}: {message}")]
    Unreadable {
        /// Where the artifact was read from.
        location: String,
        /// Parser diagnostic.
        message: String,
    },

    /// An I/O error while reading or writing the backend.
    #[error("storage I/O error at {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Errors that arise while planning a restore.
#[derive(Error, Debug)]
pub enum PlanError {
    /// A blob referenced by an item is absent from the blob store.
    #[error("missing blob {hash} for item '{item}'")]
    MissingBlob {
        /// Content hash of the missing blob.
        hash: String,
        /// Item identity that references it.
        item: String,
    },
}

/// Errors that arise from the resumability journal.
#[derive(Error, Debug)]
pub enum JournalError {
    /// The journal on disk belongs to a different snapshot.
    #[error("journal was written for snapshot {journal_hash}, not {snapshot_hash}")]
    SnapshotMismatch {
        /// Hash recorded in the journal.
        journal_hash: String,
        /// Hash of the snapshot being restored.
        snapshot_hash: String,
    },

    /// A journal line could not be parsed.
    #[error("corrupt journal line {line}: {message}")]
    CorruptLine {
        /// 1-based line number.
        line: usize,
        /// Parser diagnostic.
        message: String,
    },

    /// An I/O error while reading or appending the journal.
    #[error("journal I/O error at {path}: {source}")]
    Io {
        /// Journal file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn build_error_duplicate_domain_display() {
        let e = BuildError::DuplicateDomain("packages".to_string());
        assert_eq!(e.to_string(), "duplicate domain record 'packages'");
    }

    #[test]
    fn build_error_duplicate_item_display() {
        let e = BuildError::DuplicateItem {
            domain: "dotfiles".to_string(),
            item: ".zshrc".to_string(),
        };
        assert_eq!(e.to_string(), "duplicate item '.zshrc' in domain 'dotfiles'");
    }

    #[test]
    fn storage_error_corrupt_display() {
        let e = StorageError::Corrupt {
            location: "snapshot-x.json".to_string(),
            stored: "aaaa".to_string(),
            computed: "bbbb".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("corrupt snapshot"));
        assert!(msg.contains("aaaa"));
        assert!(msg.contains("bbbb"));
    }

    #[test]
    fn storage_error_unsupported_format_display() {
        let e = StorageError::UnsupportedFormat {
            found: 9,
            supported: 1,
        };
        assert_eq!(
            e.to_string(),
            "unsupported snapshot format version 9 (max supported 1)"
        );
    }

    #[test]
    fn storage_error_io_has_source() {
        use std::error::Error as _;
        let e = StorageError::Io {
            path: PathBuf::from("/backups"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(e.source().is_some());
    }

    #[test]
    fn journal_error_mismatch_display() {
        let e = JournalError::SnapshotMismatch {
            journal_hash: "aa".to_string(),
            snapshot_hash: "bb".to_string(),
        };
        assert!(e.to_string().contains("aa"));
        assert!(e.to_string().contains("bb"));
    }

    #[test]
    fn rebuild_error_from_sub_errors() {
        let e: RebuildError = BuildError::DuplicateDomain("x".to_string()).into();
        assert!(e.to_string().contains("snapshot build error"));
        let e: RebuildError = StorageError::Unavailable("offline".to_string()).into();
        assert!(e.to_string().contains("storage error"));
        let e: RebuildError = PlanError::MissingBlob {
            hash: "ab".to_string(),
            item: ".vimrc".to_string(),
        }
        .into();
        assert!(e.to_string().contains("restore planning error"));
    }

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn all_error_types_are_send_sync() {
        assert_send_sync::<RebuildError>();
        assert_send_sync::<BuildError>();
        assert_send_sync::<StorageError>();
        assert_send_sync::<PlanError>();
        assert_send_sync::<JournalError>();
    }

    #[test]
    fn storage_error_converts_to_anyhow() {
        let e = StorageError::Unavailable("remote down".to_string());
        let _err: anyhow::Error = e.into();
    }
}
