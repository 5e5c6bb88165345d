//! Conflict-aware restore: planning, journaling, execution.
//!
//! A restore is split into a pure planning phase and an effectful execution
//! phase. The planner diffs a snapshot against the live machine and emits an
//! ordered list of [`RestoreAction`]s; the executor applies them, journaling
//! every outcome so an interrupted restore resumes where it stopped instead
//! of repeating work.

pub mod executor;
pub mod journal;
pub mod planner;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::snapshot::Domain;

pub use executor::{run_plan, ExecutionContext};
pub use journal::Journal;
pub use planner::{live_view, plan, RestorePlan};

/// What the executor will do for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    /// Install through the package manager.
    Install,
    /// Write the snapshot content to the target path.
    WriteFile,
    /// Write the snapshot content next to the live file with a
    /// `.rebuild-new` suffix, leaving the live file untouched.
    WriteAside,
    /// Live content already matches the snapshot.
    SkipIdentical,
    /// Live content differs and the policy says leave it alone.
    SkipConflict,
    /// Present in the snapshot but not installable by the engine; surfaced
    /// in the report for the user to handle.
    NoteMissing,
}

impl ActionKind {
    /// Whether this kind mutates the machine when executed.
    #[must_use]
    pub const fn is_effectful(self) -> bool {
        matches!(self, Self::Install | Self::WriteFile | Self::WriteAside)
    }
}

/// One planned unit of restore work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreAction {
    /// Domain the item belongs to.
    pub domain: Domain,
    /// Item identity within the domain.
    pub identity: String,
    /// What will be done.
    pub kind: ActionKind,
    /// Human-readable why, shown in the report.
    pub reason: String,
    /// Content hash of the live item at plan time; `None` means the item
    /// was absent. The executor re-checks this before mutating so a target
    /// that changed between planning and execution is never clobbered.
    pub expected_live: Option<String>,
    /// A failure here poisons dependent domains.
    pub blocking: bool,
}

impl RestoreAction {
    /// Stable key identifying this action in the journal.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}/{}", self.domain, self.identity)
    }
}

/// What happened when an action was executed (or deliberately not).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    /// The mutation was applied.
    Applied,
    /// Nothing was done, with the reason.
    Skipped {
        /// Why the action was not applied.
        reason: String,
    },
    /// Not attempted because a blocking action in a prerequisite domain
    /// failed.
    SkippedDependency,
    /// The mutation was attempted and failed.
    Failed {
        /// The failure diagnostic.
        message: String,
    },
}

impl Outcome {
    /// Whether this outcome counts against a clean exit.
    #[must_use]
    pub const fn is_problem(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::SkippedDependency)
    }
}

/// Filesystem target for a file-domain item, `None` for manager-owned
/// domains.
#[must_use]
pub fn target_path(config: &Config, home: &std::path::Path, domain: Domain, identity: &str) -> Option<PathBuf> {
    match domain {
        Domain::Dotfiles => Some(home.join(identity)),
        Domain::SshKeys => Some(config.ssh_dir.join(identity)),
        Domain::Preferences => Some(config.preferences_dir.join(identity)),
        Domain::Packages | Domain::Applications => None,
    }
}

/// The side-by-side variant of a target path.
#[must_use]
pub fn aside_path(target: &std::path::Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map_or_else(String::new, |n| n.to_string_lossy().to_string());
    name.push_str(".rebuild-new");
    target.with_file_name(name)
}
