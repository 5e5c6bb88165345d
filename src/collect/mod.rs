//! Per-domain inventory collectors.
//!
//! Each collector enumerates one state domain and produces a normalized
//! [`DomainRecord`]. Collectors are read-only by contract: they may shell out
//! to inspection commands but never mutate the machine. A collector that
//! cannot enumerate part of its domain degrades to a partial record plus
//! warnings — it never aborts the whole backup.
//!
//! Collectors own disjoint domains and disjoint machine state, so the
//! backup command runs them concurrently with a per-domain timeout.

pub mod applications;
pub mod dotfiles;
pub mod packages;
pub mod preferences;
pub mod ssh_keys;

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::exec::Executor;
use crate::logging::Log;
use crate::snapshot::{BlobStore, Domain, DomainRecord, Item, ItemMeta, Payload, INLINE_THRESHOLD};

/// Everything a collector needs to inspect the machine.
pub struct CollectorContext {
    /// User's home directory.
    pub home: PathBuf,
    /// Resolved configuration (directory overrides, dotfile list).
    pub config: Arc<Config>,
    /// Subprocess seam for package-manager queries.
    pub executor: Arc<dyn Executor>,
    /// Logger shared with the rest of the run.
    pub log: Arc<dyn Log>,
    /// Blob store receiving large payloads.
    pub blobs: BlobStore,
}

/// Output of one collector: a record plus any enumeration warnings.
#[derive(Debug)]
pub struct Collection {
    /// The (possibly partial) domain record.
    pub record: DomainRecord,
    /// Non-fatal problems encountered while enumerating.
    pub warnings: Vec<String>,
}

impl Collection {
    /// An empty collection for a domain, optionally with one warning.
    #[must_use]
    pub fn empty(domain: Domain, warning: Option<String>) -> Self {
        Self {
            record: DomainRecord::new(domain),
            warnings: warning.into_iter().collect(),
        }
    }
}

/// One state domain's enumerator.
///
/// `collect` is deterministic given fixed machine state and must not mutate
/// anything. It is infallible by signature: failures become warnings on the
/// returned [`Collection`].
pub trait Collector: Send + Sync {
    /// The domain this collector owns.
    fn domain(&self) -> Domain;

    /// Enumerate the domain into a normalized record.
    fn collect(&self, ctx: &CollectorContext) -> Collection;
}

/// The complete set of collectors, in domain order.
#[must_use]
pub fn all_collectors() -> Vec<Box<dyn Collector>> {
    vec![
        Box::new(packages::PackageCollector),
        Box::new(applications::ApplicationCollector),
        Box::new(ssh_keys::SshKeyCollector),
        Box::new(dotfiles::DotfileCollector),
        Box::new(preferences::PreferenceCollector),
    ]
}

/// Run collectors concurrently, applying the per-domain timeout.
///
/// A collector that exceeds the timeout yields an empty partial record and a
/// warning; its thread is left to finish in the background (collectors are
/// read-only, so an abandoned one cannot corrupt anything).
#[must_use]
pub fn run_collectors(
    ctx: &Arc<CollectorContext>,
    collectors: Vec<Box<dyn Collector>>,
    timeout: Duration,
) -> Vec<Collection> {
    let mut pending = Vec::new();
    for collector in collectors {
        let domain = collector.domain();
        let ctx = Arc::clone(ctx);
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            // Receiver may be gone after a timeout; that is fine.
            let _ = tx.send(collector.collect(&ctx));
        });
        pending.push((domain, rx));
    }

    pending
        .into_iter()
        .map(|(domain, rx)| match rx.recv_timeout(timeout) {
            Ok(collection) => collection,
            Err(_) => Collection::empty(
                domain,
                Some(format!(
                    "collector '{domain}' timed out after {}s; captured nothing",
                    timeout.as_secs()
                )),
            ),
        })
        .collect()
}

/// Identifier for the machine a snapshot is taken on.
///
/// Hostname via the executor, falling back to `$HOSTNAME`, then `"unknown"`.
#[must_use]
pub fn machine_id(executor: &dyn Executor) -> String {
    if let Ok(result) = executor.run_unchecked("hostname", &[]) {
        let name = result.stdout.trim();
        if result.success && !name.is_empty() {
            return name.to_string();
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

/// Capture one file as an item: inline below the threshold, blob otherwise.
///
/// `identity` is the logical identity recorded in the snapshot (usually the
/// home-relative path). Returns an error string suitable for a collection
/// warning when the file cannot be read or stored.
pub fn capture_file(
    blobs: &BlobStore,
    identity: &str,
    path: &Path,
) -> Result<Item, String> {
    let bytes = std::fs::read(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;

    let meta = file_meta(path);
    let size = bytes.len() as u64;
    let payload = match String::from_utf8(bytes) {
        Ok(text) if size <= INLINE_THRESHOLD => Payload::Inline { content: text },
        Ok(text) => {
            let hash = blobs
                .put(text.as_bytes())
                .map_err(|e| format!("cannot store blob for {identity}: {e}"))?;
            Payload::Blob { hash, size }
        }
        Err(err) => {
            let bytes = err.into_bytes();
            let hash = blobs
                .put(&bytes)
                .map_err(|e| format!("cannot store blob for {identity}: {e}"))?;
            Payload::Blob { hash, size }
        }
    };

    Ok(Item {
        identity: identity.to_string(),
        payload,
        meta,
    })
}

/// Unix mode and mtime for a path, best-effort.
#[must_use]
pub fn file_meta(path: &Path) -> ItemMeta {
    let mut meta = ItemMeta::default();
    if let Ok(md) = std::fs::metadata(path) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            meta.mode = Some(md.permissions().mode() & 0o7777);
        }
        if let Ok(mtime) = md.modified() {
            if let Ok(secs) = mtime.duration_since(std::time::UNIX_EPOCH) {
                meta.mtime = Some(secs.as_secs() as i64);
            }
        }
    }
    meta
}
