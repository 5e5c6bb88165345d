#![allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
//! Interrupted-restore scenarios: journal replay, exact-remainder resume,
//! and the guards against resuming with the wrong snapshot or a damaged
//! journal.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{
    collector_context_with, live_records, populate_home, restore_journal_path, run_restore,
    take_snapshot, test_config, StubExecutor,
};
use rebuild_cli::error::JournalError;
use rebuild_cli::logging::NullLog;
use rebuild_cli::restore::journal::journal_path;
use rebuild_cli::restore::{self, ExecutionContext, Journal, Outcome};
use rebuild_cli::snapshot::BlobStore;

#[test]
fn resume_applies_exactly_the_remainder() {
    let old = tempfile::tempdir().unwrap();
    populate_home(old.path());
    let snapshot = take_snapshot(old.path(), Arc::new(StubExecutor::no_tools()));

    let fresh = tempfile::tempdir().unwrap();
    // Blobs shared by copying the old store wholesale, as a synced folder
    // would.
    let config = {
        let mut config = test_config(fresh.path());
        config.blob_dir = old.path().join(".local/share/rebuild/blobs");
        config
    };

    // Plan once so we know the action set, then fake an interruption by
    // journaling the first half as applied.
    let ctx = collector_context_with(fresh.path(), config.clone(), Arc::new(StubExecutor::no_tools()));
    let live = live_records(&ctx);
    let blobs = BlobStore::open(config.blob_dir.clone()).unwrap();
    let plan = restore::plan(&snapshot, &live, &config, &blobs).unwrap();
    let effectful: Vec<_> = plan
        .actions
        .iter()
        .filter(|a| a.kind.is_effectful())
        .collect();
    assert!(effectful.len() >= 4, "scenario needs several actions");
    let half = effectful.len() / 2;

    let path = restore_journal_path(fresh.path(), &snapshot);
    {
        let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
        assert!(previous.is_empty());
        for action in &effectful[..half] {
            journal.record(&action.key(), &Outcome::Applied).unwrap();
        }
    }

    let report = run_restore(
        fresh.path(),
        &snapshot,
        Arc::new(StubExecutor::no_tools()),
        config,
    );

    // Every journaled action was carried, every remaining one was executed:
    // files journaled as applied must not exist (they were never written),
    // the remainder must.
    for action in &effectful[..half] {
        assert!(
            !fresh.path().join(&action.identity).exists()
                && !config_target_exists(fresh.path(), &action.identity),
            "{} was re-applied",
            action.key()
        );
    }
    let applied: usize = report
        .outcomes
        .iter()
        .filter(|(_, o)| matches!(o, Outcome::Applied))
        .count();
    assert_eq!(applied, effectful.len(), "carried plus executed");
    assert!(!path.exists(), "journal removed once nothing is left to retry");
}

fn config_target_exists(home: &std::path::Path, identity: &str) -> bool {
    home.join(".ssh").join(identity).exists()
        || home.join("Library/Preferences").join(identity).exists()
}

#[test]
fn journal_from_a_different_snapshot_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let state = tmp.path().join(".local/share/rebuild");
    let hash_a = "a".repeat(64);
    let hash_b = "b".repeat(64);

    // Both hashes map to different journal files, so force the collision by
    // reusing the same path.
    let path = journal_path(&state, &hash_a);
    let (journal, _) = Journal::open(&path, &hash_a).unwrap();
    drop(journal);

    let err = Journal::open(&path, &hash_b).unwrap_err();
    assert!(matches!(err, JournalError::SnapshotMismatch { .. }));
}

#[test]
fn truncated_journal_line_is_reported_with_its_number() {
    let tmp = tempfile::tempdir().unwrap();
    let hash = "c".repeat(64);
    let path = journal_path(tmp.path(), &hash);
    let (journal, _) = Journal::open(&path, &hash).unwrap();
    journal.record("dotfiles/.zshrc", &Outcome::Applied).unwrap();

    // Simulate a torn write on the last line.
    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, format!("{text}{{\"key\":\"dotfiles/.vim")).unwrap();

    let err = Journal::open(&path, &hash).unwrap_err();
    assert!(matches!(err, JournalError::CorruptLine { line: 3, .. }));
}

#[test]
fn cancelled_run_keeps_the_journal_for_resume() {
    let old = tempfile::tempdir().unwrap();
    populate_home(old.path());
    let snapshot = take_snapshot(old.path(), Arc::new(StubExecutor::no_tools()));

    let fresh = tempfile::tempdir().unwrap();
    let config = {
        let mut config = test_config(fresh.path());
        config.blob_dir = old.path().join(".local/share/rebuild/blobs");
        config
    };
    let ctx = collector_context_with(
        fresh.path(),
        config.clone(),
        Arc::new(StubExecutor::no_tools()),
    );
    let live = live_records(&ctx);
    let blobs = BlobStore::open(config.blob_dir.clone()).unwrap();
    let plan = restore::plan(&snapshot, &live, &config, &blobs).unwrap();

    let path = restore_journal_path(fresh.path(), &snapshot);
    let (journal, previous) = Journal::open(&path, &snapshot.content_hash).unwrap();
    let exec_ctx = ExecutionContext {
        home: fresh.path().to_path_buf(),
        config: Arc::new(config),
        executor: Arc::new(StubExecutor::no_tools()),
        log: Arc::new(NullLog::new()),
        blobs,
        parallel: false,
        cancel: Arc::new(std::sync::atomic::AtomicBool::new(false)),
    };
    exec_ctx.cancel.store(true, Ordering::SeqCst);

    let report = restore::run_plan(&plan, &snapshot, &exec_ctx, journal, &previous).unwrap();
    assert!(report.interrupted);
    assert_eq!(report.exit_code(), 1);
    assert!(path.exists(), "journal stays behind for --resume");
}
