//! Plan execution with journaling, stage parallelism, and cancellation.
//!
//! Domains run in two stages derived from the dependency edges: providers
//! first (packages, applications, credentials), then the domains that assume
//! them (dotfiles, preferences). Domains within a stage own disjoint machine
//! state, so they run in parallel; actions within a domain run in order.
//! Every outcome is journaled before the next action in that domain is
//! dispatched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::JournalError;
use crate::exec::Executor;
use crate::logging::Log;
use crate::report::RestoreReport;
use crate::snapshot::{BlobStore, Domain, Payload, Snapshot};

use super::{aside_path, target_path, ActionKind, Journal, Outcome, RestoreAction, RestorePlan};

/// Everything the executor needs to mutate the machine.
pub struct ExecutionContext {
    /// User's home directory, root for dotfile targets.
    pub home: PathBuf,
    /// Resolved configuration (target directory overrides).
    pub config: Arc<Config>,
    /// Subprocess seam for package installs.
    pub executor: Arc<dyn Executor>,
    /// Logger shared with the rest of the run.
    pub log: Arc<dyn Log>,
    /// Blob store holding large payloads.
    pub blobs: BlobStore,
    /// Run domains within a stage concurrently.
    pub parallel: bool,
    /// Set by the signal handler; checked before every action.
    pub cancel: Arc<AtomicBool>,
}

/// Outcomes that a resumed run retries rather than carries forward.
fn retryable(outcome: &Outcome) -> bool {
    matches!(outcome, Outcome::Failed { .. } | Outcome::SkippedDependency)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Execute a plan, journaling every outcome.
///
/// `previous` holds the outcomes replayed from an interrupted run's journal;
/// actions with a non-retryable previous outcome are carried into the report
/// without being re-executed. The journal is deleted when the run finishes
/// with nothing left to retry.
///
/// # Errors
///
/// Returns [`JournalError`] if an outcome cannot be journaled. Execution
/// stops at that point: an unjournaled mutation would be repeated on resume.
pub fn run_plan(
    plan: &RestorePlan,
    snapshot: &Snapshot,
    ctx: &ExecutionContext,
    journal: Journal,
    previous: &BTreeMap<String, Outcome>,
) -> Result<RestoreReport, JournalError> {
    let mut carried: Vec<(RestoreAction, Outcome)> = Vec::new();
    let mut pending: BTreeMap<Domain, Vec<RestoreAction>> = BTreeMap::new();
    for action in &plan.actions {
        match previous.get(&action.key()) {
            Some(outcome) if !retryable(outcome) => {
                carried.push((action.clone(), outcome.clone()));
            }
            _ => pending.entry(action.domain).or_default().push(action.clone()),
        }
    }

    let dependent: HashSet<Domain> = Domain::ALL
        .iter()
        .flat_map(|d| d.dependents())
        .copied()
        .collect();
    let providers: Vec<Domain> = Domain::ALL
        .into_iter()
        .filter(|d| !dependent.contains(d))
        .collect();
    let dependents: Vec<Domain> = Domain::ALL
        .into_iter()
        .filter(|d| dependent.contains(d))
        .collect();

    let journal = Mutex::new(journal);
    let failed_blocking: Mutex<HashSet<Domain>> = Mutex::new(HashSet::new());
    let interrupted = AtomicBool::new(false);
    let mut executed: HashMap<String, Outcome> = HashMap::new();

    for stage in [providers, dependents] {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }
        let run_domain = |domain: &Domain| -> Result<Vec<(String, Outcome)>, JournalError> {
            let Some(actions) = pending.get(domain) else {
                return Ok(Vec::new());
            };
            let blocked = {
                let failed = lock(&failed_blocking);
                Domain::ALL
                    .iter()
                    .any(|d| failed.contains(d) && d.dependents().contains(domain))
            };
            let mut out = Vec::new();
            for action in actions {
                if ctx.cancel.load(Ordering::SeqCst) {
                    interrupted.store(true, Ordering::SeqCst);
                    break;
                }
                let outcome = if blocked {
                    Outcome::SkippedDependency
                } else {
                    execute_action(action, snapshot, ctx)
                };
                lock(&journal).record(&action.key(), &outcome)?;
                if action.blocking && matches!(outcome, Outcome::Failed { .. }) {
                    lock(&failed_blocking).insert(action.domain);
                }
                out.push((action.key(), outcome));
            }
            Ok(out)
        };

        let results: Result<Vec<Vec<(String, Outcome)>>, JournalError> = if ctx.parallel {
            stage.par_iter().map(run_domain).collect()
        } else {
            stage.iter().map(run_domain).collect()
        };
        for (key, outcome) in results?.into_iter().flatten() {
            executed.insert(key, outcome);
        }
    }

    let interrupted = interrupted.load(Ordering::SeqCst);
    let mut outcomes = Vec::new();
    for action in &plan.actions {
        let key = action.key();
        if let Some(outcome) = executed.remove(&key) {
            outcomes.push((action.clone(), outcome));
        } else if let Some((action, outcome)) =
            carried.iter().find(|(a, _)| a.key() == key).cloned()
        {
            outcomes.push((action, outcome));
        }
    }

    let report = RestoreReport {
        outcomes,
        interrupted,
    };
    let complete = !report.interrupted
        && report.failed() == 0
        && report.dependency_skips() == 0
        && report.outcomes.len() == plan.actions.len();
    if complete {
        match journal.into_inner() {
            Ok(journal) => journal.finish()?,
            Err(poisoned) => poisoned.into_inner().finish()?,
        }
    }
    Ok(report)
}

fn execute_action(action: &RestoreAction, snapshot: &Snapshot, ctx: &ExecutionContext) -> Outcome {
    match action.kind {
        ActionKind::SkipIdentical | ActionKind::SkipConflict | ActionKind::NoteMissing => {
            Outcome::Skipped {
                reason: action.reason.clone(),
            }
        }
        ActionKind::Install => install_package(action, ctx),
        ActionKind::WriteFile | ActionKind::WriteAside => write_item(action, snapshot, ctx),
    }
}

fn install_package(action: &RestoreAction, ctx: &ExecutionContext) -> Outcome {
    if !ctx.executor.which("brew") {
        return Outcome::Failed {
            message: "brew not found on PATH".to_string(),
        };
    }
    let (name, args): (&str, Vec<&str>) = match action.identity.strip_prefix("cask:") {
        Some(cask) => (cask, vec!["install", "--cask", cask]),
        None => (action.identity.as_str(), vec!["install", &action.identity]),
    };
    ctx.log.debug(&format!("brew install {name}"));
    match ctx.executor.run("brew", &args) {
        Ok(_) => Outcome::Applied,
        Err(e) => Outcome::Failed {
            message: format!("{e:#}"),
        },
    }
}

fn write_item(action: &RestoreAction, snapshot: &Snapshot, ctx: &ExecutionContext) -> Outcome {
    let item = snapshot
        .record(action.domain)
        .and_then(|r| r.find(&action.identity));
    let Some(item) = item else {
        return Outcome::Failed {
            message: "item missing from snapshot".to_string(),
        };
    };
    let Some(target) = target_path(&ctx.config, &ctx.home, action.domain, &action.identity) else {
        return Outcome::Failed {
            message: "domain has no filesystem target".to_string(),
        };
    };

    // The plan was made against a live view that may be stale by now. A
    // direct write only proceeds if the target still looks the way the
    // planner saw it; aside writes never clobber, so they skip the check.
    if action.kind == ActionKind::WriteFile && live_hash(&target) != action.expected_live {
        return Outcome::Skipped {
            reason: "target changed since planning; keeping local copy".to_string(),
        };
    }

    let bytes = match &item.payload {
        Payload::Inline { content } => content.as_bytes().to_vec(),
        Payload::Blob { hash, .. } => match ctx.blobs.get(hash) {
            Ok(bytes) => bytes,
            Err(e) => {
                return Outcome::Failed {
                    message: format!("cannot read blob {hash}: {e}"),
                }
            }
        },
        Payload::Reference { .. } => {
            return Outcome::Failed {
                message: "item has no file content".to_string(),
            }
        }
    };

    let dest = if action.kind == ActionKind::WriteAside {
        aside_path(&target)
    } else {
        target
    };
    if let Err(e) = write_file(&dest, &bytes, item.meta.mode) {
        return Outcome::Failed {
            message: format!("cannot write {}: {e}", dest.display()),
        };
    }
    ctx.log.debug(&format!("wrote {}", dest.display()));
    Outcome::Applied
}

/// Hash of the target's current content, `None` if absent.
fn live_hash(path: &Path) -> Option<String> {
    std::fs::read(path)
        .ok()
        .map(|bytes| hex::encode(Sha256::digest(&bytes)))
}

fn write_file(path: &Path, bytes: &[u8], mode: Option<u32>) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::PermissionsExt as _;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    }
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;
    use crate::exec::test_helpers::MockExecutor;
    use crate::logging::NullLog;
    use crate::restore::journal::journal_path;
    use crate::restore::planner;
    use crate::snapshot::{self, DomainRecord, Item};

    fn make_ctx(home: &Path, executor: MockExecutor) -> ExecutionContext {
        let mut config = Config::defaults(home);
        config.ssh_dir = home.join(".ssh");
        config.preferences_dir = home.join("Library/Preferences");
        ExecutionContext {
            home: home.to_path_buf(),
            config: Arc::new(config),
            executor: Arc::new(executor),
            log: Arc::new(NullLog::new()),
            blobs: BlobStore::open(home.join("blobs")).unwrap(),
            parallel: false,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    fn inline(identity: &str, content: &str) -> Item {
        Item::new(
            identity,
            Payload::Inline {
                content: content.to_string(),
            },
        )
    }

    fn record(domain: Domain, items: Vec<Item>) -> DomainRecord {
        let mut record = DomainRecord::new(domain);
        record.items = items;
        record
    }

    fn run(
        snapshot: &Snapshot,
        live: &[DomainRecord],
        ctx: &ExecutionContext,
    ) -> (RestoreReport, PathBuf) {
        let plan = planner::plan(snapshot, live, &ctx.config, &ctx.blobs).unwrap();
        let path = journal_path(&ctx.home, &snapshot.content_hash);
        let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
        let report = run_plan(&plan, snapshot, ctx, journal, &previous).unwrap();
        (report, path)
    }

    #[test]
    fn writes_absent_dotfile_and_removes_journal() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        let snapshot = snapshot::build(
            vec![record(
                Domain::Dotfiles,
                vec![inline(".zshrc", "export A=1\n")],
            )],
            "old",
        )
        .unwrap();

        let (report, journal) = run(&snapshot, &[], &ctx);
        assert_eq!(report.applied(), 1);
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".zshrc")).unwrap(),
            "export A=1\n"
        );
        assert!(!journal.exists(), "journal removed after a clean run");
    }

    #[test]
    fn conflicting_dotfile_is_written_aside_leaving_original() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(".zshrc"), "export A=2\n").unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        let snapshot = snapshot::build(
            vec![record(
                Domain::Dotfiles,
                vec![inline(".zshrc", "export A=1\n")],
            )],
            "old",
        )
        .unwrap();
        let live = vec![record(
            Domain::Dotfiles,
            vec![inline(".zshrc", "export A=2\n")],
        )];

        let (report, _) = run(&snapshot, &live, &ctx);
        assert_eq!(report.applied(), 1);
        assert_eq!(report.exit_code(), 1, "aside writes need user attention");
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".zshrc")).unwrap(),
            "export A=2\n"
        );
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".zshrc.rebuild-new")).unwrap(),
            "export A=1\n"
        );
    }

    #[test]
    fn failed_blocking_install_skips_dependent_domains() {
        let tmp = tempfile::tempdir().unwrap();
        // brew present but install fails
        let ctx = make_ctx(tmp.path(), MockExecutor::fail().with_which(true));
        let snapshot = snapshot::build(
            vec![
                record(
                    Domain::Packages,
                    vec![Item::new(
                        "jq",
                        Payload::Reference {
                            version: "1.7".to_string(),
                        },
                    )],
                ),
                record(Domain::Dotfiles, vec![inline(".zshrc", "export A=1\n")]),
            ],
            "old",
        )
        .unwrap();

        let (report, journal) = run(&snapshot, &[], &ctx);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.dependency_skips(), 1);
        assert!(!tmp.path().join(".zshrc").exists());
        assert!(journal.exists(), "journal kept while retries remain");
    }

    #[test]
    fn resumed_run_executes_only_the_remainder() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        let snapshot = snapshot::build(
            vec![record(
                Domain::Dotfiles,
                vec![inline(".bashrc", "b\n"), inline(".zshrc", "z\n")],
            )],
            "old",
        )
        .unwrap();
        let plan = planner::plan(&snapshot, &[], &ctx.config, &ctx.blobs).unwrap();
        let path = journal_path(&ctx.home, &snapshot.content_hash);

        // First run already applied .bashrc before being interrupted.
        {
            let (journal, _) = Journal::open(&path, &snapshot.content_hash).unwrap();
            journal.record("dotfiles/.bashrc", &Outcome::Applied).unwrap();
        }

        let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
        let report = run_plan(&plan, &snapshot, &ctx, journal, &previous).unwrap();

        assert!(!tmp.path().join(".bashrc").exists(), "not re-applied");
        assert!(tmp.path().join(".zshrc").exists());
        assert_eq!(report.applied(), 2, "carried outcome counts in the report");
        assert!(!path.exists());
    }

    #[test]
    fn target_changed_since_planning_is_not_clobbered() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        let snapshot = snapshot::build(
            vec![record(
                Domain::Dotfiles,
                vec![inline(".zshrc", "export A=1\n")],
            )],
            "old",
        )
        .unwrap();
        let plan = planner::plan(&snapshot, &[], &ctx.config, &ctx.blobs).unwrap();
        // File appears between planning and execution.
        std::fs::write(tmp.path().join(".zshrc"), "surprise\n").unwrap();

        let path = journal_path(&ctx.home, &snapshot.content_hash);
        let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
        let report = run_plan(&plan, &snapshot, &ctx, journal, &previous).unwrap();

        assert_eq!(report.applied(), 0);
        assert_eq!(
            std::fs::read_to_string(tmp.path().join(".zshrc")).unwrap(),
            "surprise\n"
        );
    }

    #[test]
    fn restored_ssh_key_keeps_its_mode() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        let mut key = Item::new(
            "id_ed25519",
            Payload::Inline {
                content: "KEY".to_string(),
            },
        );
        key.meta.mode = Some(0o600);
        let snapshot =
            snapshot::build(vec![record(Domain::SshKeys, vec![key])], "old").unwrap();
        let mut config = (*ctx.config).clone();
        config.set_conflict_policy(Domain::SshKeys, ConflictPolicy::Overwrite);
        let ctx = ExecutionContext {
            config: Arc::new(config),
            ..make_ctx(tmp.path(), MockExecutor::fail())
        };

        let (report, _) = run(&snapshot, &[], &ctx);
        assert_eq!(report.applied(), 1);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            let mode = std::fs::metadata(tmp.path().join(".ssh/id_ed25519"))
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o7777, 0o600);
        }
    }

    #[test]
    fn cancellation_stops_before_the_next_action() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = make_ctx(tmp.path(), MockExecutor::fail());
        ctx.cancel.store(true, Ordering::SeqCst);
        let snapshot = snapshot::build(
            vec![record(Domain::Dotfiles, vec![inline(".zshrc", "z\n")])],
            "old",
        )
        .unwrap();

        let plan = planner::plan(&snapshot, &[], &ctx.config, &ctx.blobs).unwrap();
        let path = journal_path(&ctx.home, &snapshot.content_hash);
        let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
        let report = run_plan(&plan, &snapshot, &ctx, journal, &previous).unwrap();

        assert!(report.interrupted);
        assert_eq!(report.exit_code(), 1);
        assert!(!tmp.path().join(".zshrc").exists());
        assert!(path.exists(), "journal kept for resume");
    }
}
