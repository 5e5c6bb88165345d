//! Restore planning: diff a snapshot against the live machine.
//!
//! Planning is pure with respect to the machine: it reads the live view and
//! the blob store but mutates nothing. Every decision carries its reason so
//! the plan can be shown verbatim in dry-run mode.

use std::sync::Arc;

use crate::collect::{all_collectors, run_collectors, CollectorContext};
use crate::config::{Config, ConflictPolicy};
use crate::error::PlanError;
use crate::snapshot::{BlobStore, Domain, DomainRecord, Item, Payload, Snapshot};

use super::{ActionKind, RestoreAction};

/// An ordered restore plan for one snapshot.
#[derive(Debug)]
pub struct RestorePlan {
    /// Hash of the snapshot this plan restores; the journal is keyed on it.
    pub snapshot_hash: String,
    /// Actions in execution order: domains in prerequisite order, item
    /// identities lexicographic within each domain.
    pub actions: Vec<RestoreAction>,
}

impl RestorePlan {
    /// Number of actions that would mutate the machine.
    #[must_use]
    pub fn effectful(&self) -> usize {
        self.actions.iter().filter(|a| a.kind.is_effectful()).count()
    }

    /// True when the live machine already matches the snapshot.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.actions
            .iter()
            .all(|a| a.kind == ActionKind::SkipIdentical)
    }
}

/// Collect a fresh view of the live machine, one record per domain.
///
/// Collector warnings are logged but do not fail planning; a domain that
/// cannot be enumerated plans as if empty, which degrades to conservative
/// conflict handling at execution time via the pre-mutation re-check.
#[must_use]
pub fn live_view(ctx: &Arc<CollectorContext>) -> Vec<DomainRecord> {
    let collections = run_collectors(ctx, all_collectors(), ctx.config.collector_timeout);
    let mut records = Vec::with_capacity(collections.len());
    for collection in collections {
        for warning in &collection.warnings {
            ctx.log.warn(warning);
        }
        records.push(collection.record);
    }
    records
}

/// Build the restore plan for `snapshot` against the live records.
///
/// # Errors
///
/// Returns [`PlanError::MissingBlob`] if an action would need blob content
/// that is absent from the local blob store. Planning fails fast here: a
/// partial restore that stops mid-write because a blob is missing is worse
/// than no restore.
pub fn plan(
    snapshot: &Snapshot,
    live: &[DomainRecord],
    config: &Config,
    blobs: &BlobStore,
) -> Result<RestorePlan, PlanError> {
    let mut actions = Vec::new();
    for domain in Domain::ALL {
        let Some(record) = snapshot.record(domain) else {
            continue;
        };
        let live_record = live.iter().find(|r| r.domain == domain);
        for item in &record.items {
            let live_item = live_record.and_then(|r| r.find(&item.identity));
            let action = plan_item(domain, item, live_item, config);
            verify_blobs(&action, item, blobs)?;
            actions.push(action);
        }
    }
    Ok(RestorePlan {
        snapshot_hash: snapshot.content_hash.clone(),
        actions,
    })
}

fn plan_item(
    domain: Domain,
    item: &Item,
    live_item: Option<&Item>,
    config: &Config,
) -> RestoreAction {
    let Some(live_item) = live_item else {
        return plan_absent(domain, item);
    };

    let live_hash = live_item.payload.content_hash();
    if live_hash == item.payload.content_hash() {
        return RestoreAction {
            domain,
            identity: item.identity.clone(),
            kind: ActionKind::SkipIdentical,
            reason: "live content identical".to_string(),
            expected_live: Some(live_hash),
            blocking: false,
        };
    }

    let policy = config.conflict_policy(domain);
    let (kind, reason, blocking) = match (domain, policy) {
        (Domain::Packages, ConflictPolicy::Overwrite) => (
            ActionKind::Install,
            format!("installed version differs from {}", describe(item)),
            true,
        ),
        // Side-by-side has no meaning for manager-owned state.
        (Domain::Packages | Domain::Applications, _) => (
            ActionKind::SkipConflict,
            format!("live version differs from {}; keeping installed", describe(item)),
            false,
        ),
        (_, ConflictPolicy::Skip) => (
            ActionKind::SkipConflict,
            "live content differs; keeping local copy".to_string(),
            false,
        ),
        (_, ConflictPolicy::Overwrite) => (
            ActionKind::WriteFile,
            "live content differs; policy overwrites".to_string(),
            false,
        ),
        (_, ConflictPolicy::SideBySide) => (
            ActionKind::WriteAside,
            "live content differs; writing aside for manual merge".to_string(),
            false,
        ),
    };
    RestoreAction {
        domain,
        identity: item.identity.clone(),
        kind,
        reason,
        expected_live: Some(live_hash),
        blocking,
    }
}

fn plan_absent(domain: Domain, item: &Item) -> RestoreAction {
    let (kind, reason, blocking) = match domain {
        Domain::Packages => (
            ActionKind::Install,
            format!("not installed (snapshot has {})", describe(item)),
            true,
        ),
        Domain::Applications => (
            ActionKind::NoteMissing,
            "not present; install manually or via a cask".to_string(),
            false,
        ),
        Domain::SshKeys | Domain::Dotfiles | Domain::Preferences => (
            ActionKind::WriteFile,
            "absent on this machine".to_string(),
            false,
        ),
    };
    RestoreAction {
        domain,
        identity: item.identity.clone(),
        kind,
        reason,
        expected_live: None,
        blocking,
    }
}

fn describe(item: &Item) -> String {
    match &item.payload {
        Payload::Reference { version } => format!("version {version}"),
        Payload::Inline { .. } | Payload::Blob { .. } => "snapshot content".to_string(),
    }
}

/// A plan that writes blob content must be executable with the blobs we
/// actually have.
fn verify_blobs(action: &RestoreAction, item: &Item, blobs: &BlobStore) -> Result<(), PlanError> {
    if !matches!(action.kind, ActionKind::WriteFile | ActionKind::WriteAside) {
        return Ok(());
    }
    if let Payload::Blob { hash, .. } = &item.payload {
        if !blobs.contains(hash) {
            return Err(PlanError::MissingBlob {
                hash: hash.clone(),
                item: item.identity.clone(),
            });
        }
    }
    Ok(())
}
