use anyhow::Result;
use std::sync::Arc;

use crate::cli::GlobalOpts;
use crate::collect::{all_collectors, machine_id, run_collectors};
use crate::logging::{Log as _, Logger};
use crate::snapshot;

use super::CommandSetup;

/// Run the backup command, returning the process exit code.
///
/// Collectors never abort the backup; their problems surface as warnings
/// and turn the exit code to 1. Errors returned here are fatal (exit 2 at
/// the top level): snapshot assembly bugs or an unusable storage backend.
///
/// # Errors
///
/// Returns an error if configuration loading, snapshot assembly, or the
/// storage write fails.
pub fn run(global: &GlobalOpts, log: &Arc<Logger>) -> Result<i32> {
    let setup = CommandSetup::init(global, log)?;
    let ctx = setup.collector_context(log)?;

    log.stage("Collecting machine state");
    let collections = run_collectors(&ctx, all_collectors(), setup.config.collector_timeout);
    let mut records = Vec::with_capacity(collections.len());
    for collection in collections {
        for warning in &collection.warnings {
            log.warn(warning);
        }
        log.debug(&format!(
            "{}: {} items",
            collection.record.domain,
            collection.record.items.len()
        ));
        records.push(collection.record);
    }

    let machine = machine_id(ctx.executor.as_ref());
    let snapshot = snapshot::build(records, machine)?;
    let items: usize = snapshot.records.iter().map(|r| r.items.len()).sum();
    log.info(&format!(
        "captured {items} items across {} domains ({})",
        snapshot.records.len(),
        snapshot.short_hash()
    ));

    if global.dry_run {
        log.dry_run(&format!(
            "write snapshot {} to {}",
            snapshot.short_hash(),
            setup.config.storage_location.display()
        ));
        return Ok(exit_code(log));
    }

    log.stage("Writing snapshot");
    let backend = setup.open_storage()?;
    let location = backend.write(&snapshot)?;
    log.info(&format!("snapshot written to {location}"));

    Ok(exit_code(log))
}

/// 0 on a clean backup, 1 when any collector warned.
fn exit_code(log: &Logger) -> i32 {
    i32::from(log.warning_count() > 0)
}
