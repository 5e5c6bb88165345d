//! Snapshot data model: domains, items, records, and the artifact itself.
//!
//! Heterogeneous machine state (packages, files, credentials, preferences)
//! is unified behind a single [`Item`] abstraction with a tagged payload, so
//! the planner and executor stay domain-agnostic and new domains only need a
//! collector.

pub mod blob;
pub mod builder;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use blob::BlobStore;
pub use builder::build;

/// Highest snapshot format version this binary can parse.
///
/// Artifacts declaring a newer version fail closed with
/// [`StorageError::UnsupportedFormat`](crate::error::StorageError::UnsupportedFormat).
pub const FORMAT_VERSION: u32 = 1;

/// Payloads at or below this size are stored inline; larger ones go to the
/// blob store as content-addressed references.
pub const INLINE_THRESHOLD: u64 = 4096;

/// A category of machine state, collected and restored independently.
///
/// The variant order is the restore prerequisite order: packages and
/// applications first, then credentials, then the files that assume them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Domain {
    /// Installed package-manager packages (Homebrew formulae and casks).
    Packages,
    /// Application bundles in the applications directory.
    Applications,
    /// SSH keys and client configuration.
    SshKeys,
    /// Shell and tool configuration files in the home directory.
    Dotfiles,
    /// Application preference databases (plists).
    Preferences,
}

impl Domain {
    /// All domains in restore prerequisite order.
    pub const ALL: [Self; 5] = [
        Self::Packages,
        Self::Applications,
        Self::SshKeys,
        Self::Dotfiles,
        Self::Preferences,
    ];

    /// The stable wire name of this domain.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Packages => "packages",
            Self::Applications => "applications",
            Self::SshKeys => "ssh-keys",
            Self::Dotfiles => "dotfiles",
            Self::Preferences => "preferences",
        }
    }

    /// Domains whose restore depends on this one having converged.
    ///
    /// A failed blocking action in this domain marks all planned actions in
    /// the dependent domains as skipped.
    #[must_use]
    pub fn dependents(self) -> &'static [Self] {
        match self {
            Self::Packages => &[Self::Dotfiles, Self::Preferences],
            Self::SshKeys | Self::Applications | Self::Dotfiles | Self::Preferences => &[],
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "packages" => Ok(Self::Packages),
            "applications" => Ok(Self::Applications),
            "ssh-keys" => Ok(Self::SshKeys),
            "dotfiles" => Ok(Self::Dotfiles),
            "preferences" => Ok(Self::Preferences),
            other => Err(format!("unknown domain '{other}'")),
        }
    }
}

/// Content or reference carried by an [`Item`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Payload {
    /// Small text content stored directly in the snapshot.
    Inline {
        /// The file content.
        content: String,
    },
    /// Content-addressed reference into the blob store.
    Blob {
        /// SHA-256 of the content, hex-encoded.
        hash: String,
        /// Content size in bytes.
        size: u64,
    },
    /// Version reference for state owned by an external manager (packages).
    Reference {
        /// Installed version string.
        version: String,
    },
}

impl Payload {
    /// Stable digest of this payload for equality comparison during planning.
    ///
    /// Inline payloads hash their content so an inline item and a blob item
    /// with identical bytes compare equal.
    #[must_use]
    pub fn content_hash(&self) -> String {
        match self {
            Self::Inline { content } => hex::encode(Sha256::digest(content.as_bytes())),
            Self::Blob { hash, .. } => hash.clone(),
            Self::Reference { version } => hex::encode(Sha256::digest(version.as_bytes())),
        }
    }
}

/// Filesystem metadata captured with an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemMeta {
    /// Unix permission bits, when meaningful for the domain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    /// Modification time, seconds since the epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mtime: Option<i64>,
    /// Application or manager that owns this state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// The smallest unit of captured state.
///
/// Identity is unique within a domain record — the builder rejects
/// collisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Logical identity: home-relative path, package name, or plist domain.
    pub identity: String,
    /// Content, blob reference, or version reference.
    pub payload: Payload,
    /// Captured metadata.
    #[serde(default)]
    pub meta: ItemMeta,
}

impl Item {
    /// Create an item with empty metadata.
    #[must_use]
    pub fn new(identity: impl Into<String>, payload: Payload) -> Self {
        Self {
            identity: identity.into(),
            payload,
            meta: ItemMeta::default(),
        }
    }
}

/// All items captured for one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRecord {
    /// The domain this record covers.
    pub domain: Domain,
    /// Per-domain schema version.
    pub schema_version: u32,
    /// Items, sorted by identity once built.
    pub items: Vec<Item>,
}

impl DomainRecord {
    /// Create an empty record with the current schema version.
    #[must_use]
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            schema_version: 1,
            items: Vec::new(),
        }
    }

    /// Look up an item by identity.
    #[must_use]
    pub fn find(&self, identity: &str) -> Option<&Item> {
        self.items.iter().find(|i| i.identity == identity)
    }
}

/// A versioned, hashable artifact representing captured machine state.
///
/// Immutable once written; later backups supersede rather than mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Artifact format version; checked before parsing the rest.
    pub format_version: u32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Identifier of the machine the snapshot was taken on.
    pub machine: String,
    /// Domain records, sorted by domain name.
    pub records: Vec<DomainRecord>,
    /// SHA-256 over the canonical serialization of `records`, hex-encoded.
    pub content_hash: String,
}

impl Snapshot {
    /// Compute the canonical content hash over a slice of records.
    ///
    /// The records must already be in canonical order (sorted by domain,
    /// items sorted by identity) — [`builder::build`] guarantees this. Two
    /// backups of an unchanged machine therefore produce an identical hash.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn compute_hash(records: &[DomainRecord]) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(records)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Recompute the hash over this snapshot's records.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn recompute_hash(&self) -> Result<String, serde_json::Error> {
        Self::compute_hash(&self.records)
    }

    /// Short hash prefix used in artifact file names.
    #[must_use]
    pub fn short_hash(&self) -> &str {
        self.content_hash.get(..8).unwrap_or(&self.content_hash)
    }

    /// Look up the record for a domain.
    #[must_use]
    pub fn record(&self, domain: Domain) -> Option<&DomainRecord> {
        self.records.iter().find(|r| r.domain == domain)
    }
}
