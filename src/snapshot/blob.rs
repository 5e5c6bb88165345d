//! Content-addressed blob store for large item payloads.
//!
//! Payloads above the inline threshold are stored once, keyed by the SHA-256
//! of their content, under two-level fan-out paths (`ab/cdef…`). Identical
//! content across items and across snapshots lands on the same path, which
//! is the deduplication guarantee.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Filesystem-backed content-addressed store.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open (and create if needed) a blob store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// The store's root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fan-out path for a hex hash: `ab/cdef…`.
    fn path_for(&self, hash: &str) -> PathBuf {
        let (prefix, rest) = hash.split_at(2.min(hash.len()));
        self.root.join(prefix).join(rest)
    }

    /// Store content, returning its hex SHA-256.
    ///
    /// Writing is idempotent: content already present is not rewritten. The
    /// write goes through a temp file and rename so a crash never leaves a
    /// truncated blob under its final name.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure.
    pub fn put(&self, content: &[u8]) -> io::Result<String> {
        let hash = hex::encode(Sha256::digest(content));
        let path = self.path_for(&hash);
        if path.exists() {
            return Ok(hash);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &path)?;
        Ok(hash)
    }

    /// Retrieve content by hash.
    ///
    /// # Errors
    ///
    /// Returns [`io::ErrorKind::NotFound`] if the blob is absent, or any
    /// other I/O error from reading it.
    pub fn get(&self, hash: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(hash))
    }

    /// Whether a blob with this hash is present.
    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.path_for(hash).exists()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn store() -> (BlobStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store = BlobStore::open(tmp.path().join("blobs")).unwrap();
        (store, tmp)
    }

    #[test]
    fn put_then_get_round_trips() {
        let (store, _tmp) = store();
        let hash = store.put(b"hello world").unwrap();
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
    }

    #[test]
    fn put_is_idempotent_and_deduplicates() {
        let (store, _tmp) = store();
        let a = store.put(b"same content").unwrap();
        let b = store.put(b"same content").unwrap();
        assert_eq!(a, b);
        assert!(store.contains(&a));
    }

    #[test]
    fn distinct_content_gets_distinct_hashes() {
        let (store, _tmp) = store();
        let a = store.put(b"one").unwrap();
        let b = store.put(b"two").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn get_missing_blob_is_not_found() {
        let (store, _tmp) = store();
        let err = store.get("deadbeef00").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn blobs_use_fan_out_paths() {
        let (store, _tmp) = store();
        let hash = store.put(b"fan out").unwrap();
        let expected = store.root().join(&hash[..2]).join(&hash[2..]);
        assert!(expected.exists());
    }

    #[test]
    fn no_tmp_files_left_behind() {
        let (store, _tmp) = store();
        let hash = store.put(b"clean").unwrap();
        let dir = store.root().join(&hash[..2]);
        let leftovers: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|x| x == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
