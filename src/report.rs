//! Restore run summary.

use crate::logging::Log;
use crate::restore::{ActionKind, Outcome, RestoreAction};
use crate::snapshot::Domain;

/// Every action's outcome for one restore run, in execution order.
#[derive(Debug)]
pub struct RestoreReport {
    /// Per-action outcomes, including those replayed from a resumed journal.
    pub outcomes: Vec<(RestoreAction, Outcome)>,
    /// The run was stopped by a cancellation signal before finishing.
    pub interrupted: bool,
}

impl RestoreReport {
    /// Actions applied to the machine.
    #[must_use]
    pub fn applied(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Applied))
    }

    /// Actions that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    /// Actions skipped because a prerequisite domain failed.
    #[must_use]
    pub fn dependency_skips(&self) -> usize {
        self.count(|o| matches!(o, Outcome::SkippedDependency))
    }

    /// Conflicts left for the user: policy skips and side-by-side writes.
    #[must_use]
    pub fn conflicts(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(a, _)| {
                matches!(a.kind, ActionKind::SkipConflict | ActionKind::WriteAside)
            })
            .count()
    }

    /// Items the engine cannot install itself.
    #[must_use]
    pub fn manual_items(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(a, _)| a.kind == ActionKind::NoteMissing)
            .count()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// Process exit code: 0 when the machine converged cleanly, 1 when
    /// anything needs the user's attention. Fatal errors never reach a
    /// report; they surface as errors before or during the run.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let needs_attention = self.interrupted
            || self.failed() > 0
            || self.dependency_skips() > 0
            || self.conflicts() > 0
            || self.manual_items() > 0;
        i32::from(needs_attention)
    }

    /// Log the per-domain summary and every non-clean outcome.
    pub fn render(&self, log: &dyn Log) {
        for domain in Domain::ALL {
            let total = self.outcomes.iter().filter(|(a, _)| a.domain == domain).count();
            if total == 0 {
                continue;
            }
            let applied = self
                .outcomes
                .iter()
                .filter(|(a, o)| a.domain == domain && matches!(o, Outcome::Applied))
                .count();
            log.info(&format!("{domain}: {applied}/{total} applied"));
        }
        for (action, outcome) in &self.outcomes {
            match outcome {
                Outcome::Applied => {}
                Outcome::Skipped { reason } => {
                    if action.kind != ActionKind::SkipIdentical {
                        log.warn(&format!("{}: {reason}", action.key()));
                    }
                }
                Outcome::SkippedDependency => {
                    log.warn(&format!(
                        "{}: skipped, prerequisite domain failed",
                        action.key()
                    ));
                }
                Outcome::Failed { message } => {
                    log.error(&format!("{}: {message}", action.key()));
                }
            }
        }
        if self.interrupted {
            log.warn("restore interrupted; run again with --resume to finish");
        }
    }
}
