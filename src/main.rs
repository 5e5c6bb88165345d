use std::sync::Arc;

use clap::Parser;

use rebuild_cli::cli::{Cli, Command};
use rebuild_cli::commands;
use rebuild_cli::logging::{self, Log as _, Logger};

/// Exit codes: 0 converged, 1 partial (warnings, conflicts, retryable
/// failures), 2 fatal (unusable storage, corrupt snapshot, bad invocation).
fn main() {
    let args = Cli::parse();
    logging::init_subscriber(args.verbose);
    let log = Arc::new(Logger::new());

    let result = match args.command {
        Command::Backup(_) => commands::backup::run(&args.global, &log),
        Command::Restore(ref opts) => commands::restore::run(&args.global, opts, &log),
        Command::List => commands::list::run(&args.global, &log),
        Command::Version => {
            println!("rebuild {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            log.error(&format!("{e:#}"));
            2
        }
    };
    std::process::exit(code);
}
