// Shared helpers for integration tests.
//
// Provides a temporary-home-backed environment: a configuration whose
// collector directories all point inside the temp home, a scripted executor
// standing in for brew and hostname, and shortcuts for taking snapshots and
// running restores end to end.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use rebuild_cli::collect::{self, CollectorContext};
use rebuild_cli::config::Config;
use rebuild_cli::exec::{ExecResult, Executor};
use rebuild_cli::logging::{Log, NullLog};
use rebuild_cli::report::RestoreReport;
use rebuild_cli::restore::journal::journal_path;
use rebuild_cli::restore::{self, ExecutionContext, Journal};
use rebuild_cli::snapshot::{self, BlobStore, DomainRecord, Snapshot};

/// Scripted [`Executor`] replaying `(success, stdout)` responses in order.
///
/// When the queue runs dry every call fails, which collectors treat as a
/// warning rather than an error.
#[derive(Debug, Default)]
pub struct StubExecutor {
    responses: Mutex<VecDeque<(bool, String)>>,
    which: bool,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl StubExecutor {
    pub fn new(which: bool, responses: Vec<(bool, String)>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            which,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// An executor for a machine without brew.
    pub fn no_tools() -> Self {
        Self::new(false, Vec::new())
    }

    pub fn recorded_calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn next(&self, program: &str, args: &[&str]) -> (bool, String) {
        self.calls.lock().expect("calls lock").push((
            program.to_string(),
            args.iter().map(|s| (*s).to_string()).collect(),
        ));
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or((false, String::new()))
    }
}

impl Executor for StubExecutor {
    fn run(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        let (success, stdout) = self.next(program, args);
        if success {
            Ok(ExecResult {
                stdout,
                stderr: String::new(),
                success: true,
                code: Some(0),
            })
        } else {
            anyhow::bail!("stubbed command failed: {program}")
        }
    }

    fn run_in(&self, _: &Path, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.run(program, args)
    }

    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        let (success, stdout) = self.next(program, args);
        Ok(ExecResult {
            stdout,
            stderr: String::new(),
            success,
            code: Some(i32::from(!success)),
        })
    }

    fn which(&self, _: &str) -> bool {
        self.which
    }
}

/// Configuration with every collector directory inside the temp home.
pub fn test_config(home: &Path) -> Config {
    let mut config = Config::defaults(home);
    config.applications_dir = home.join("Applications");
    config.ssh_dir = home.join(".ssh");
    config.preferences_dir = home.join("Library/Preferences");
    config
}

pub fn collector_context(home: &Path, executor: Arc<dyn Executor>) -> Arc<CollectorContext> {
    collector_context_with(home, test_config(home), executor)
}

pub fn collector_context_with(
    home: &Path,
    config: Config,
    executor: Arc<dyn Executor>,
) -> Arc<CollectorContext> {
    let blobs = BlobStore::open(config.blob_dir.clone()).expect("open blob store");
    Arc::new(CollectorContext {
        home: home.to_path_buf(),
        config: Arc::new(config),
        executor,
        log: Arc::new(NullLog::new()),
        blobs,
    })
}

/// Collect every domain and build a snapshot of the temp home.
pub fn take_snapshot(home: &Path, executor: Arc<dyn Executor>) -> Snapshot {
    take_snapshot_with(home, executor, test_config(home))
}

/// [`take_snapshot`] with an explicit configuration (e.g. a blob store
/// shared between the backed-up and restored machines, the way a synced
/// store colocates blobs with artifacts).
pub fn take_snapshot_with(home: &Path, executor: Arc<dyn Executor>, config: Config) -> Snapshot {
    let ctx = collector_context_with(home, config, executor);
    let records = live_records(&ctx);
    snapshot::build(records, "test-machine").expect("build snapshot")
}

pub fn live_records(ctx: &Arc<CollectorContext>) -> Vec<DomainRecord> {
    collect::run_collectors(
        ctx,
        collect::all_collectors(),
        ctx.config.collector_timeout,
    )
    .into_iter()
    .map(|c| c.record)
    .collect()
}

/// Plan and execute a full restore of `snapshot` into `home`, journaled
/// under the home's state directory.
pub fn run_restore(
    home: &Path,
    snapshot: &Snapshot,
    executor: Arc<dyn Executor>,
    config: Config,
) -> RestoreReport {
    let config = Arc::new(config);
    let log: Arc<dyn Log> = Arc::new(NullLog::new());
    let blobs = BlobStore::open(config.blob_dir.clone()).expect("open blob store");

    let ctx = collector_context_with(home, (*config).clone(), Arc::clone(&executor));
    let live = live_records(&ctx);
    let plan = restore::plan(snapshot, &live, &config, &blobs).expect("plan restore");

    let path = restore_journal_path(home, snapshot);
    let (journal, previous) =
        Journal::open(&path, &snapshot.content_hash).expect("open journal");
    let exec_ctx = ExecutionContext {
        home: home.to_path_buf(),
        config,
        executor,
        log,
        blobs,
        parallel: false,
        cancel: Arc::new(AtomicBool::new(false)),
    };
    restore::run_plan(&plan, snapshot, &exec_ctx, journal, &previous).expect("run plan")
}

/// Journal location used by [`run_restore`].
pub fn restore_journal_path(home: &Path, snapshot: &Snapshot) -> PathBuf {
    journal_path(&home.join(".local/share/rebuild"), &snapshot.content_hash)
}

/// Write a populated fake home: dotfiles, an SSH key pair, a plist, and an
/// application bundle directory.
pub fn populate_home(home: &Path) {
    std::fs::write(home.join(".zshrc"), "export EDITOR=vim\n").expect("write .zshrc");
    std::fs::write(home.join(".gitconfig"), "[user]\n\tname = dev\n").expect("write .gitconfig");

    let ssh = home.join(".ssh");
    std::fs::create_dir_all(&ssh).expect("create .ssh");
    std::fs::write(ssh.join("id_ed25519"), "PRIVATE KEY A").expect("write key");
    std::fs::write(ssh.join("id_ed25519.pub"), "ssh-ed25519 AAAA dev@old").expect("write pub");

    let prefs = home.join("Library/Preferences");
    std::fs::create_dir_all(&prefs).expect("create prefs");
    std::fs::write(prefs.join("com.example.Editor.plist"), "<plist/>").expect("write plist");

    std::fs::create_dir_all(home.join("Applications/iTerm.app")).expect("create app");
}
