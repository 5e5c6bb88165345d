//! Application inventory collector.

use super::{Collection, Collector, CollectorContext};
use crate::snapshot::{Domain, DomainRecord, Item, ItemMeta, Payload};

/// Inventories the applications directory (default `/Applications`).
///
/// Applications are captured name-only: the engine records presence so the
/// restore report can list what is missing, but installation is delegated to
/// the package domain (casks) or left to the user.
#[derive(Debug)]
pub struct ApplicationCollector;

impl Collector for ApplicationCollector {
    fn domain(&self) -> Domain {
        Domain::Applications
    }

    fn collect(&self, ctx: &CollectorContext) -> Collection {
        let dir = &ctx.config.applications_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Collection::empty(
                    Domain::Applications,
                    Some(format!("cannot read {}: {e}", dir.display())),
                )
            }
        };

        let mut record = DomainRecord::new(Domain::Applications);
        let mut warnings = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warnings.push(format!("skipping unreadable entry in {}: {e}", dir.display()));
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let mut meta = ItemMeta {
                source: Some("applications-dir".to_string()),
                ..ItemMeta::default()
            };
            if let Ok(md) = entry.metadata() {
                if let Ok(mtime) = md.modified() {
                    if let Ok(secs) = mtime.duration_since(std::time::UNIX_EPOCH) {
                        meta.mtime = Some(secs.as_secs() as i64);
                    }
                }
            }
            record.items.push(Item {
                identity: name,
                payload: Payload::Reference {
                    version: "installed".to_string(),
                },
                meta,
            });
        }
        Collection { record, warnings }
    }
}
