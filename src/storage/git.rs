//! Git-repository storage backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::StorageError;
use crate::exec::Executor;
use crate::snapshot::Snapshot;

use super::{LocalStore, Location, StorageBackend};

/// Stores snapshot artifacts as committed files in a git work tree.
///
/// Every write commits the new artifact; reads and listings fast-forward
/// from `origin` first when a remote is configured, so a restore on a fresh
/// machine sees snapshots pushed from the old one. All git operations go
/// through the [`Executor`] seam.
pub struct GitStore {
    work_dir: PathBuf,
    files: LocalStore,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for GitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitStore")
            .field("work_dir", &self.work_dir)
            .field("files", &self.files)
            .finish_non_exhaustive()
    }
}

impl GitStore {
    /// Open (or initialise) the repository at `work_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] if git is not installed or the
    /// repository cannot be initialised.
    pub fn open(work_dir: &Path) -> Result<Self, StorageError> {
        Self::with_executor(work_dir, Arc::new(crate::exec::SystemExecutor))
    }

    /// Open with an explicit executor.
    ///
    /// # Errors
    ///
    /// See [`GitStore::open`].
    pub fn with_executor(
        work_dir: &Path,
        executor: Arc<dyn Executor>,
    ) -> Result<Self, StorageError> {
        if !executor.which("git") {
            return Err(StorageError::Unavailable(
                "git not found on PATH".to_string(),
            ));
        }
        let store = Self {
            work_dir: work_dir.to_path_buf(),
            files: LocalStore::new(work_dir),
            executor,
        };
        if !work_dir.join(".git").exists() {
            std::fs::create_dir_all(work_dir).map_err(|source| StorageError::Io {
                path: work_dir.to_path_buf(),
                source,
            })?;
            store.git(&["init", "--quiet"])?;
        }
        Ok(store)
    }

    fn git(&self, args: &[&str]) -> Result<String, StorageError> {
        let result = self
            .executor
            .run_in(&self.work_dir, "git", args)
            .map_err(|e| StorageError::Unavailable(format!("git {}: {e:#}", args.join(" "))))?;
        Ok(result.stdout)
    }

    fn has_remote(&self) -> bool {
        self.executor
            .run_in(&self.work_dir, "git", &["remote", "get-url", "origin"])
            .is_ok()
    }

    /// Fast-forward from origin before reading. A failed pull means the
    /// remote copy is unreachable or diverged, either way the local state
    /// cannot be trusted to be current.
    fn refresh(&self) -> Result<(), StorageError> {
        if self.has_remote() {
            self.git(&["pull", "--ff-only", "--quiet"])?;
        }
        Ok(())
    }
}

impl StorageBackend for GitStore {
    fn write(&self, snapshot: &Snapshot) -> Result<Location, StorageError> {
        let location = self.files.write(snapshot)?;
        self.git(&["add", &location.0])?;
        let message = format!(
            "snapshot {} from {}",
            snapshot.short_hash(),
            snapshot.machine
        );
        self.git(&["commit", "--quiet", "-m", &message])?;
        if self.has_remote() {
            self.git(&["push", "--quiet", "origin", "HEAD"])?;
        }
        Ok(location)
    }

    fn read(&self, location: &Location) -> Result<Snapshot, StorageError> {
        self.refresh()?;
        self.files.read(location)
    }

    fn list(&self) -> Result<Vec<Location>, StorageError> {
        self.refresh()?;
        self.files.list()
    }
}
