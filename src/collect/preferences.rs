//! Preference database collector.

use super::{capture_file, Collection, Collector, CollectorContext};
use crate::snapshot::{Domain, DomainRecord, Payload};

/// Captures plist files under the preferences directory
/// (default `~/Library/Preferences`).
///
/// Plists are binary more often than not, so payloads are forced into the
/// blob store like credentials. The item identity is the plist file name,
/// which is the owning application's reverse-domain identifier.
#[derive(Debug)]
pub struct PreferenceCollector;

impl Collector for PreferenceCollector {
    fn domain(&self) -> Domain {
        Domain::Preferences
    }

    fn collect(&self, ctx: &CollectorContext) -> Collection {
        let dir = &ctx.config.preferences_dir;
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                return Collection::empty(
                    Domain::Preferences,
                    Some(format!("cannot read {}: {e}", dir.display())),
                )
            }
        };

        let mut record = DomainRecord::new(Domain::Preferences);
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
            if !path.is_file() || !name.ends_with(".plist") {
                continue;
            }
            match capture_file(&ctx.blobs, &name, &path) {
                Ok(mut item) => {
                    if let Payload::Inline { content } = item.payload {
                        let size = content.len() as u64;
                        match ctx.blobs.put(content.as_bytes()) {
                            Ok(hash) => item.payload = Payload::Blob { hash, size },
                            Err(e) => {
                                warnings.push(format!("cannot store blob for {name}: {e}"));
                                continue;
                            }
                        }
                    }
                    item.meta.source = Some("preferences-dir".to_string());
                    record.items.push(item);
                }
                Err(warning) => warnings.push(warning),
            }
        }

        Collection { record, warnings }
    }
}
