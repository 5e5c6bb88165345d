//! TOML configuration for the engine.
//!
//! Everything is optional: a missing config file yields full defaults, and
//! every field has a documented default. The directory overrides double as
//! the test seam — integration tests point collectors at temp directories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::snapshot::Domain;

/// Dotfiles captured when the config does not list its own set.
///
/// Recovered from the original tool's backup list.
pub const DEFAULT_DOTFILES: &[&str] = &[
    ".bash_profile",
    ".bashrc",
    ".gitconfig",
    ".gitignore_global",
    ".profile",
    ".tmux.conf",
    ".vimrc",
    ".zshrc",
];

/// How a planner resolves an item that exists on the live machine with
/// content differing from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Leave the live file alone and warn. Default for credentials and
    /// preferences — never silently overwritten.
    Skip,
    /// Replace the live content with the snapshot content.
    Overwrite,
    /// Write the snapshot content alongside the live file with a
    /// `.rebuild-new` suffix and flag it for manual merge. Default for
    /// dotfiles.
    SideBySide,
}

/// Storage backend kinds selectable via `--storage` or config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageKind {
    /// Plain local directory.
    Local,
    /// Cloud-synced folder; reads wait for sync readiness.
    Synced,
    /// Git repository with an `origin` remote.
    Git,
}

impl std::str::FromStr for StorageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "synced" => Ok(Self::Synced),
            "git" => Ok(Self::Git),
            other => Err(format!("unknown storage kind '{other}' (local, synced, git)")),
        }
    }
}

/// On-disk configuration shape. All fields optional.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    blob_dir: Option<PathBuf>,
    storage_kind: Option<StorageKind>,
    storage_location: Option<PathBuf>,
    collector_timeout_secs: Option<u64>,
    dotfiles: Option<Vec<String>>,
    applications_dir: Option<PathBuf>,
    ssh_dir: Option<PathBuf>,
    preferences_dir: Option<PathBuf>,
    #[serde(default)]
    conflict_policy: BTreeMap<String, ConflictPolicy>,
}

/// Resolved engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Content-addressed blob store directory.
    pub blob_dir: PathBuf,
    /// Default storage backend kind.
    pub storage_kind: StorageKind,
    /// Default storage location (directory or git work tree).
    pub storage_location: PathBuf,
    /// Per-domain collector timeout.
    pub collector_timeout: Duration,
    /// Home-relative dotfiles to capture.
    pub dotfiles: Vec<String>,
    /// Applications directory to inventory.
    pub applications_dir: PathBuf,
    /// SSH configuration directory.
    pub ssh_dir: PathBuf,
    /// Preference plist directory.
    pub preferences_dir: PathBuf,
    /// Explicit per-domain conflict policy overrides.
    conflict_overrides: BTreeMap<Domain, ConflictPolicy>,
}

impl Config {
    /// Build the default configuration for a home directory.
    #[must_use]
    pub fn defaults(home: &Path) -> Self {
        Self {
            blob_dir: home.join(".local/share/rebuild/blobs"),
            storage_kind: StorageKind::Local,
            storage_location: home.join(".local/share/rebuild/snapshots"),
            collector_timeout: Duration::from_secs(30),
            dotfiles: DEFAULT_DOTFILES.iter().map(|s| (*s).to_string()).collect(),
            applications_dir: PathBuf::from("/Applications"),
            ssh_dir: home.join(".ssh"),
            preferences_dir: home.join("Library/Preferences"),
            conflict_overrides: BTreeMap::new(),
        }
    }

    /// Load configuration, merging the TOML file at `path` (if present) over
    /// the defaults for `home`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if it names an unknown domain in `[conflict_policy]`.
    pub fn load(home: &Path, path: &Path) -> Result<Self> {
        let mut config = Self::defaults(home);
        if !path.exists() {
            return Ok(config);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        if let Some(dir) = raw.blob_dir {
            config.blob_dir = dir;
        }
        if let Some(kind) = raw.storage_kind {
            config.storage_kind = kind;
        }
        if let Some(location) = raw.storage_location {
            config.storage_location = location;
        }
        if let Some(secs) = raw.collector_timeout_secs {
            config.collector_timeout = Duration::from_secs(secs);
        }
        if let Some(dotfiles) = raw.dotfiles {
            config.dotfiles = dotfiles;
        }
        if let Some(dir) = raw.applications_dir {
            config.applications_dir = dir;
        }
        if let Some(dir) = raw.ssh_dir {
            config.ssh_dir = dir;
        }
        if let Some(dir) = raw.preferences_dir {
            config.preferences_dir = dir;
        }
        for (name, policy) in raw.conflict_policy {
            let domain: Domain = name
                .parse()
                .map_err(|e: String| anyhow::anyhow!("in [conflict_policy]: {e}"))?;
            config.conflict_overrides.insert(domain, policy);
        }
        Ok(config)
    }

    /// Default config file path under `home`.
    #[must_use]
    pub fn default_path(home: &Path) -> PathBuf {
        home.join(".config/rebuild/config.toml")
    }

    /// The conflict policy in effect for a domain.
    ///
    /// Defaults: dotfiles are written side-by-side, everything else is
    /// skipped. Credentials are never overwritten unless the user opts in
    /// explicitly via the config file.
    #[must_use]
    pub fn conflict_policy(&self, domain: Domain) -> ConflictPolicy {
        if let Some(policy) = self.conflict_overrides.get(&domain) {
            return *policy;
        }
        match domain {
            Domain::Dotfiles => ConflictPolicy::SideBySide,
            Domain::Packages
            | Domain::Applications
            | Domain::SshKeys
            | Domain::Preferences => ConflictPolicy::Skip,
        }
    }

    /// Override a conflict policy programmatically (used by tests).
    pub fn set_conflict_policy(&mut self, domain: Domain, policy: ConflictPolicy) {
        self.conflict_overrides.insert(domain, policy);
    }
}
