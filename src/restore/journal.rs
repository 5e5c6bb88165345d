//! Append-only restore journal.
//!
//! One JSON object per line: a header naming the snapshot being restored,
//! then one entry per completed action. Each append is flushed and synced
//! before the next action is dispatched, so after a crash the journal is a
//! complete record of everything that finished. A resumed restore replays
//! the journal into a completed-set and executes only the remainder; the
//! journal is deleted once every action has an outcome.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::JournalError;

use super::Outcome;

/// First line of every journal file.
#[derive(Debug, Serialize, Deserialize)]
struct Header {
    snapshot_hash: String,
    started_at: DateTime<Utc>,
}

/// One completed action.
#[derive(Debug, Serialize, Deserialize)]
struct Entry {
    key: String,
    #[serde(flatten)]
    outcome: Outcome,
    at: DateTime<Utc>,
}

/// Handle to the on-disk journal for one restore run.
#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
}

/// Journal file path for a snapshot inside the engine state directory.
#[must_use]
pub fn journal_path(state_dir: &Path, snapshot_hash: &str) -> PathBuf {
    let short = snapshot_hash.get(..8).unwrap_or(snapshot_hash);
    state_dir.join(format!("restore-{short}.journal"))
}

impl Journal {
    /// Open the journal at `path` for a restore of `snapshot_hash`,
    /// returning the outcomes of actions already completed by a previous
    /// interrupted run (empty on a fresh start).
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::SnapshotMismatch`] if an existing journal
    /// belongs to a different snapshot, [`JournalError::CorruptLine`] if a
    /// line cannot be parsed, and [`JournalError::Io`] for I/O failures.
    pub fn open(
        path: &Path,
        snapshot_hash: &str,
    ) -> Result<(Self, BTreeMap<String, Outcome>), JournalError> {
        if path.exists() {
            let completed = Self::replay(path, snapshot_hash)?;
            return Ok((
                Self {
                    path: path.to_path_buf(),
                },
                completed,
            ));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| JournalError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let header = Header {
            snapshot_hash: snapshot_hash.to_string(),
            started_at: Utc::now(),
        };
        let journal = Self {
            path: path.to_path_buf(),
        };
        journal.append_line(&header)?;
        Ok((journal, BTreeMap::new()))
    }

    fn replay(path: &Path, snapshot_hash: &str) -> Result<BTreeMap<String, Outcome>, JournalError> {
        let text = std::fs::read_to_string(path).map_err(|source| JournalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = text.lines().enumerate();

        let (_, header_line) = lines.next().ok_or_else(|| JournalError::CorruptLine {
            line: 1,
            message: "empty journal".to_string(),
        })?;
        let header: Header =
            serde_json::from_str(header_line).map_err(|e| JournalError::CorruptLine {
                line: 1,
                message: e.to_string(),
            })?;
        if header.snapshot_hash != snapshot_hash {
            return Err(JournalError::SnapshotMismatch {
                journal_hash: header.snapshot_hash,
                snapshot_hash: snapshot_hash.to_string(),
            });
        }

        let mut completed = BTreeMap::new();
        for (index, line) in lines {
            if line.trim().is_empty() {
                // A crash mid-append can leave a final empty line.
                continue;
            }
            let entry: Entry =
                serde_json::from_str(line).map_err(|e| JournalError::CorruptLine {
                    line: index + 1,
                    message: e.to_string(),
                })?;
            completed.insert(entry.key, entry.outcome);
        }
        Ok(completed)
    }

    /// Record an action outcome. Synced to disk before returning.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the append or sync fails.
    pub fn record(&self, key: &str, outcome: &Outcome) -> Result<(), JournalError> {
        self.append_line(&Entry {
            key: key.to_string(),
            outcome: outcome.clone(),
            at: Utc::now(),
        })
    }

    fn append_line<T: Serialize>(&self, value: &T) -> Result<(), JournalError> {
        let io_err = |source| JournalError::Io {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_string(value).map_err(|e| JournalError::CorruptLine {
            line: 0,
            message: e.to_string(),
        })?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        writeln!(file, "{json}").map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(())
    }

    /// Delete the journal after a fully completed restore.
    ///
    /// # Errors
    ///
    /// Returns [`JournalError::Io`] if the file cannot be removed.
    pub fn finish(self) -> Result<(), JournalError> {
        std::fs::remove_file(&self.path).map_err(|source| JournalError::Io {
            path: self.path,
            source,
        })
    }

    /// Where this journal lives.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    const HASH: &str = "deadbeefcafe0123";

    #[test]
    fn fresh_journal_starts_empty_and_persists_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        let (journal, completed) = Journal::open(&path, HASH).unwrap();
        assert!(completed.is_empty());
        assert!(journal.path().exists());
    }

    #[test]
    fn recorded_outcomes_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        {
            let (journal, _) = Journal::open(&path, HASH).unwrap();
            journal.record("packages/jq", &Outcome::Applied).unwrap();
            journal
                .record(
                    "dotfiles/.zshrc",
                    &Outcome::Skipped {
                        reason: "identical".to_string(),
                    },
                )
                .unwrap();
            // Dropped without finish(), as after a crash.
        }

        let (_, completed) = Journal::open(&path, HASH).unwrap();
        assert_eq!(completed.len(), 2);
        assert_eq!(completed.get("packages/jq"), Some(&Outcome::Applied));
        assert!(matches!(
            completed.get("dotfiles/.zshrc"),
            Some(Outcome::Skipped { .. })
        ));
    }

    #[test]
    fn journal_for_another_snapshot_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        let (journal, _) = Journal::open(&path, HASH).unwrap();
        drop(journal);

        let err = Journal::open(&path, "0123456789abcdef").unwrap_err();
        match err {
            JournalError::SnapshotMismatch {
                journal_hash,
                snapshot_hash,
            } => {
                assert_eq!(journal_hash, HASH);
                assert_eq!(snapshot_hash, "0123456789abcdef");
            }
            other => unreachable!("expected SnapshotMismatch, got {other}"),
        }
    }

    #[test]
    fn corrupt_line_reports_its_number() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        let (journal, _) = Journal::open(&path, HASH).unwrap();
        journal.record("packages/jq", &Outcome::Applied).unwrap();
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("{not json\n");
        std::fs::write(&path, text).unwrap();

        let err = Journal::open(&path, HASH).unwrap_err();
        assert!(matches!(err, JournalError::CorruptLine { line: 3, .. }));
    }

    #[test]
    fn finish_removes_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        let (journal, _) = Journal::open(&path, HASH).unwrap();
        journal.finish().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn latest_outcome_for_a_key_wins_on_replay() {
        let tmp = tempfile::tempdir().unwrap();
        let path = journal_path(tmp.path(), HASH);
        let (journal, _) = Journal::open(&path, HASH).unwrap();
        journal
            .record(
                "packages/jq",
                &Outcome::Failed {
                    message: "network".to_string(),
                },
            )
            .unwrap();
        journal.record("packages/jq", &Outcome::Applied).unwrap();

        let (_, completed) = Journal::open(&path, HASH).unwrap();
        assert_eq!(completed.get("packages/jq"), Some(&Outcome::Applied));
    }
}
