//! Package inventory collector (Homebrew formulae and casks).

use super::{Collection, Collector, CollectorContext};
use crate::snapshot::{Domain, DomainRecord, Item, ItemMeta, Payload};

/// Collects installed Homebrew formulae and casks via `brew list --versions`.
///
/// Casks share the item namespace with formulae; a cask identity is prefixed
/// with `cask:` so the two cannot collide.
#[derive(Debug)]
pub struct PackageCollector;

impl PackageCollector {
    fn parse_versions(stdout: &str, source: &str, prefix: &str, record: &mut DomainRecord) {
        for line in stdout.lines() {
            let mut parts = line.split_whitespace();
            let Some(name) = parts.next() else { continue };
            // `brew list --versions` may print several versions; the last
            // one listed is the active install.
            let version = parts.last().unwrap_or("unknown").to_string();
            record.items.push(Item {
                identity: format!("{prefix}{name}"),
                payload: Payload::Reference { version },
                meta: ItemMeta {
                    source: Some(source.to_string()),
                    ..ItemMeta::default()
                },
            });
        }
    }
}

impl Collector for PackageCollector {
    fn domain(&self) -> Domain {
        Domain::Packages
    }

    fn collect(&self, ctx: &CollectorContext) -> Collection {
        if !ctx.executor.which("brew") {
            return Collection::empty(
                Domain::Packages,
                Some("brew not found on PATH; package inventory skipped".to_string()),
            );
        }

        let mut record = DomainRecord::new(Domain::Packages);
        let mut warnings = Vec::new();

        match ctx.executor.run_unchecked("brew", &["list", "--versions"]) {
            Ok(result) if result.success => {
                Self::parse_versions(&result.stdout, "brew", "", &mut record);
            }
            Ok(result) => warnings.push(format!(
                "brew list --versions failed: {}",
                result.stderr.trim()
            )),
            Err(e) => warnings.push(format!("brew list --versions: {e}")),
        }

        match ctx
            .executor
            .run_unchecked("brew", &["list", "--cask", "--versions"])
        {
            Ok(result) if result.success => {
                Self::parse_versions(&result.stdout, "brew-cask", "cask:", &mut record);
            }
            Ok(result) => warnings.push(format!(
                "brew list --cask failed: {}",
                result.stderr.trim()
            )),
            Err(e) => warnings.push(format!("brew list --cask: {e}")),
        }

        Collection { record, warnings }
    }
}
