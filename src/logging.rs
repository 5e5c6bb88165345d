//! Logging infrastructure for structured console output.
//!
//! All output flows through the [`Log`] trait so that library code never
//! prints directly; the concrete [`Logger`] forwards to [`tracing`] and the
//! subscriber installed by [`init_subscriber`] decides formatting and level
//! filtering (`REBUILD_LOG` environment variable, `-v` flag).

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing_subscriber::EnvFilter;

/// Abstraction over logging backends.
///
/// Tasks and collectors log through this trait so tests can capture output
/// or discard it without a global subscriber.
pub trait Log: Send + Sync {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (suppressed unless verbose).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a dry-run action message.
    fn dry_run(&self, msg: &str);
    /// Number of warnings emitted so far.
    fn warning_count(&self) -> usize;
}

/// Structured logger with dry-run awareness and warning counting.
///
/// The warning count feeds the command exit code: a backup or restore that
/// completed with warnings exits 1 (recoverable partial failure) rather
/// than 0.
#[derive(Debug, Default)]
pub struct Logger {
    warnings: AtomicUsize,
}

impl Logger {
    /// Create a new logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Log for Logger {
    fn stage(&self, msg: &str) {
        tracing::info!(target: "rebuild::stage", "==> {msg}");
    }

    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }

    fn debug(&self, msg: &str) {
        tracing::debug!("{msg}");
    }

    fn warn(&self, msg: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        tracing::warn!("{msg}");
    }

    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }

    fn dry_run(&self, msg: &str) {
        tracing::info!(target: "rebuild::dry_run", "[dry run] {msg}");
    }

    fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}

/// Install the global tracing subscriber.
///
/// Level defaults to `info`, or `debug` when `verbose` is set; both can be
/// overridden with the `REBUILD_LOG` environment variable.
pub fn init_subscriber(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("REBUILD_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default));
    // Ignore the error when a subscriber is already installed (tests).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .try_init();
}

/// Logger that discards output but still counts warnings.
///
/// Used by unit tests that only assert on warning behaviour.
#[derive(Debug, Default)]
pub struct NullLog {
    warnings: AtomicUsize,
}

impl NullLog {
    /// Create a new silent logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Log for NullLog {
    fn stage(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn debug(&self, _: &str) {}
    fn warn(&self, _: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
    }
    fn error(&self, _: &str) {}
    fn dry_run(&self, _: &str) {}
    fn warning_count(&self) -> usize {
        self.warnings.load(Ordering::SeqCst)
    }
}
