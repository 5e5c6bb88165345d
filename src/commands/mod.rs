pub mod backup;
pub mod list;
pub mod restore;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::GlobalOpts;
use crate::collect::CollectorContext;
use crate::config::Config;
use crate::exec::SystemExecutor;
use crate::logging::{Log, Logger};
use crate::snapshot::BlobStore;
use crate::storage::{self, StorageBackend};

/// Shared state produced by the common command setup sequence.
///
/// Resolves the home directory, loads configuration, and applies the
/// command-line storage overrides so each command does not repeat the
/// boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    pub home: PathBuf,
    pub config: Arc<Config>,
}

impl CommandSetup {
    /// Resolve the home directory and load configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `HOME` is unset or the config file exists but
    /// cannot be parsed.
    pub fn init(global: &GlobalOpts, log: &Arc<Logger>) -> Result<Self> {
        Self::with_home(home_dir()?, global, log)
    }

    /// [`init`](Self::init) with an explicit home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn with_home(home: PathBuf, global: &GlobalOpts, log: &Arc<Logger>) -> Result<Self> {
        let path = global
            .config
            .clone()
            .unwrap_or_else(|| Config::default_path(&home));
        log.debug(&format!("config: {}", path.display()));
        let mut config = Config::load(&home, &path)?;
        if let Some(kind) = global.storage {
            config.storage_kind = kind;
        }
        if let Some(store) = &global.store {
            config.storage_location = store.clone();
        }
        Ok(Self {
            home,
            config: Arc::new(config),
        })
    }

    /// Open the configured storage backend.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be initialised.
    pub fn open_storage(&self) -> Result<Box<dyn StorageBackend>> {
        let backend = storage::open(self.config.storage_kind, &self.config.storage_location)?;
        Ok(backend)
    }

    /// Build the collector context used by backup and by restore planning.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob store cannot be opened.
    pub fn collector_context(&self, log: &Arc<Logger>) -> Result<Arc<CollectorContext>> {
        let blobs = BlobStore::open(&self.config.blob_dir)
            .with_context(|| format!("opening blob store {}", self.config.blob_dir.display()))?;
        let log: Arc<dyn Log> = Arc::<Logger>::clone(log);
        Ok(Arc::new(CollectorContext {
            home: self.home.clone(),
            config: Arc::clone(&self.config),
            executor: Arc::new(SystemExecutor),
            log,
            blobs,
        }))
    }

    /// Directory holding engine state (restore journals) next to the blob
    /// store.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.config
            .blob_dir
            .parent()
            .map_or_else(|| self.home.clone(), std::path::Path::to_path_buf)
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
        .context("HOME is not set")
}
