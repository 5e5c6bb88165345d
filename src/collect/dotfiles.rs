//! Dotfile collector.

use super::{capture_file, Collection, Collector, CollectorContext};
use crate::snapshot::{Domain, DomainRecord};

/// Captures the configured list of home-relative dotfiles.
///
/// Absent files are simply not captured (a new machine rarely has every
/// dotfile); unreadable files produce warnings.
#[derive(Debug)]
pub struct DotfileCollector;

impl Collector for DotfileCollector {
    fn domain(&self) -> Domain {
        Domain::Dotfiles
    }

    fn collect(&self, ctx: &CollectorContext) -> Collection {
        let mut record = DomainRecord::new(Domain::Dotfiles);
        let mut warnings = Vec::new();

        for name in &ctx.config.dotfiles {
            let path = ctx.home.join(name);
            if !path.exists() {
                continue;
            }
            if !path.is_file() {
                warnings.push(format!("{name} is not a regular file; skipped"));
                continue;
            }
            match capture_file(&ctx.blobs, name, &path) {
                Ok(item) => record.items.push(item),
                Err(warning) => warnings.push(warning),
            }
        }

        Collection { record, warnings }
    }
}
