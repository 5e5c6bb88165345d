//! Snapshot assembly: canonical ordering, collision checks, content hash.

use std::collections::HashSet;

use chrono::Utc;

use super::{Domain, DomainRecord, Snapshot, FORMAT_VERSION};
use crate::error::BuildError;

/// Assemble collector output into a snapshot artifact.
///
/// Records are sorted by domain name and items by identity before hashing,
/// so the resulting `content_hash` is independent of collector completion
/// order and identical across repeated backups of an unchanged machine.
///
/// # Errors
///
/// Returns [`BuildError::DuplicateDomain`] if two records claim the same
/// domain, [`BuildError::DuplicateItem`] if an item identity collides within
/// a domain, or [`BuildError::Serialize`] if canonical serialization fails.
pub fn build(records: Vec<DomainRecord>, machine: impl Into<String>) -> Result<Snapshot, BuildError> {
    let mut records = records;

    let mut seen_domains: HashSet<Domain> = HashSet::new();
    for record in &records {
        if !seen_domains.insert(record.domain) {
            return Err(BuildError::DuplicateDomain(record.domain.name().to_string()));
        }
    }

    for record in &mut records {
        record.items.sort_by(|a, b| a.identity.cmp(&b.identity));
        let mut seen = HashSet::new();
        for item in &record.items {
            if !seen.insert(item.identity.as_str()) {
                return Err(BuildError::DuplicateItem {
                    domain: record.domain.name().to_string(),
                    item: item.identity.clone(),
                });
            }
        }
    }
    records.sort_by_key(|r| r.domain);

    let content_hash = Snapshot::compute_hash(&records)?;
    Ok(Snapshot {
        format_version: FORMAT_VERSION,
        created_at: Utc::now(),
        machine: machine.into(),
        records,
        content_hash,
    })
}
