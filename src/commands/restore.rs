use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::cli::{GlobalOpts, RestoreOpts};
use crate::logging::{Log as _, Logger};
use crate::restore::journal::journal_path;
use crate::restore::{self, ExecutionContext, Journal};
use crate::storage::Location;

use super::CommandSetup;

/// Run the restore command, returning the process exit code.
///
/// # Errors
///
/// Returns an error for fatal conditions: unreachable storage, a corrupt or
/// unsupported artifact, a missing blob, or a journal that belongs to a
/// different snapshot.
pub fn run(global: &GlobalOpts, opts: &RestoreOpts, log: &Arc<Logger>) -> Result<i32> {
    let setup = CommandSetup::init(global, log)?;
    let backend = setup.open_storage()?;

    log.stage("Reading snapshot");
    let location = match &opts.location {
        Some(name) => Location(name.clone()),
        None => match backend.list()?.pop() {
            Some(newest) => newest,
            None => bail!(
                "no snapshots stored in {}",
                setup.config.storage_location.display()
            ),
        },
    };
    let snapshot = backend.read(&location)?;
    log.info(&format!(
        "snapshot {} from {} ({})",
        snapshot.short_hash(),
        snapshot.machine,
        snapshot.created_at.format("%Y-%m-%d %H:%M UTC")
    ));

    log.stage("Planning");
    let ctx = setup.collector_context(log)?;
    let live = restore::live_view(&ctx);
    let plan = restore::plan(&snapshot, &live, &setup.config, &ctx.blobs)?;
    log.info(&format!(
        "{} actions planned, {} change the machine",
        plan.actions.len(),
        plan.effectful()
    ));

    if global.dry_run {
        for action in &plan.actions {
            log.dry_run(&format!("{}: {:?} ({})", action.key(), action.kind, action.reason));
        }
        return Ok(0);
    }

    let journal_file = journal_path(&setup.state_dir(), &plan.snapshot_hash);
    if journal_file.exists() && !opts.resume {
        bail!(
            "an interrupted restore of this snapshot exists at {}; run again with --resume",
            journal_file.display()
        );
    }
    let (journal, previous) = Journal::open(&journal_file, &plan.snapshot_hash)?;
    if !previous.is_empty() {
        log.info(&format!(
            "resuming: {} actions already completed",
            previous.len()
        ));
    }

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        // Fails when a handler is already installed; harmless in tests.
        let _ = ctrlc::set_handler(move || cancel.store(true, Ordering::SeqCst));
    }

    log.stage("Restoring");
    let exec_ctx = ExecutionContext {
        home: setup.home.clone(),
        config: Arc::clone(&setup.config),
        executor: Arc::clone(&ctx.executor),
        log: Arc::clone(&ctx.log),
        blobs: ctx.blobs.clone(),
        parallel: global.parallel,
        cancel,
    };
    let report = restore::run_plan(&plan, &snapshot, &exec_ctx, journal, &previous)?;
    report.render(log.as_ref());

    let code = report.exit_code().max(i32::from(log.warning_count() > 0));
    Ok(code)
}
