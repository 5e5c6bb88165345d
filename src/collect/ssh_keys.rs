//! SSH credential collector.

use super::{capture_file, Collection, Collector, CollectorContext};
use crate::snapshot::{Domain, DomainRecord};

/// Captures regular files under the SSH directory (default `~/.ssh`).
///
/// Everything is stored as a blob reference regardless of size so private
/// key material never appears inline in the snapshot JSON, and unix modes
/// are preserved for permission-faithful restore. Known transient files
/// (agent sockets, control masters, `known_hosts.old`) are ignored.
#[derive(Debug)]
pub struct SshKeyCollector;

/// Files under `~/.ssh` that are machine-local state, not credentials.
const IGNORED: &[&str] = &["known_hosts.old", "agent.sock"];

impl Collector for SshKeyCollector {
    fn domain(&self) -> Domain {
        Domain::SshKeys
    }

    fn collect(&self, ctx: &CollectorContext) -> Collection {
        let dir = &ctx.config.ssh_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Collection::empty(
                    Domain::SshKeys,
                    Some(format!("cannot read {}: {e}", dir.display())),
                )
            }
        };

        let mut record = DomainRecord::new(Domain::SshKeys);
        let mut warnings = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(format!("skipping unreadable entry in {}: {e}", dir.display()));
                    continue;
                }
            };
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            if IGNORED.contains(&name.as_str()) || !path.is_file() {
                continue;
            }
            match capture_file_as_blob(ctx, &name, &path) {
                Ok(item) => record.items.push(item),
                Err(warning) => warnings.push(warning),
            }
        }

        Collection { record, warnings }
    }
}

/// Capture a credential file, forcing the payload into the blob store.
fn capture_file_as_blob(
    ctx: &CollectorContext,
    name: &str,
    path: &std::path::Path,
) -> Result<crate::snapshot::Item, String> {
    let mut item = capture_file(&ctx.blobs, name, path)?;
    if let crate::snapshot::Payload::Inline { content } = item.payload {
        let size = content.len() as u64;
        let hash = ctx
            .blobs
            .put(content.as_bytes())
            .map_err(|e| format!("cannot store blob for {name}: {e}"))?;
        item.payload = crate::snapshot::Payload::Blob { hash, size };
    }
    Ok(item)
}
