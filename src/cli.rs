use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::StorageKind;

/// Top-level CLI entry point for the backup/restore engine.
#[derive(Parser, Debug)]
#[command(
    name = "rebuild",
    about = "Development environment backup and restore engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub global: GlobalOpts,
}

/// Options shared across all subcommands.
#[derive(Parser, Debug, Clone)]
pub struct GlobalOpts {
    /// Config file path (default ~/.config/rebuild/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Preview actions without applying
    #[arg(short = 'd', long, global = true)]
    pub dry_run: bool,

    /// Storage backend kind (local, synced, git)
    #[arg(long, global = true)]
    pub storage: Option<StorageKind>,

    /// Storage directory or git work tree
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Disable parallel execution across domains (parallel is enabled by default)
    #[arg(long = "no-parallel", global = true, action = clap::ArgAction::SetFalse)]
    pub parallel: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture this machine's state into a new snapshot
    Backup(BackupOpts),
    /// Restore a stored snapshot onto this machine
    Restore(RestoreOpts),
    /// List stored snapshots
    List,
    /// Print version information
    Version,
}

/// Options for the `backup` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct BackupOpts {}

/// Options for the `restore` subcommand.
#[derive(Parser, Debug, Clone)]
pub struct RestoreOpts {
    /// Snapshot artifact name (from `list`); newest when omitted
    pub location: Option<String>,

    /// Continue an interrupted restore from its journal
    #[arg(long)]
    pub resume: bool,
}
