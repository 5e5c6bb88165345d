//! Development environment backup and restore engine.
//!
//! Captures the state of a developer workstation — installed packages,
//! application inventory, dotfiles, SSH credentials, and preferences — into a
//! versioned, content-hashed snapshot, and replays that snapshot onto a fresh
//! machine without destroying existing user data.
//!
//! The public API is organised into five layers:
//!
//! - **[`collect`]** — per-domain inventory collectors (read-only, warning-tolerant)
//! - **[`snapshot`]** — the snapshot data model, canonical builder, and blob store
//! - **[`storage`]** — pluggable snapshot persistence (local, synced folder, git)
//! - **[`restore`]** — conflict-aware planner and journaled, resumable executor
//! - **[`commands`]** — top-level subcommand orchestration (`backup`, `restore`, `list`)
#![deny(clippy::or_fun_call)]

pub mod cli;
pub mod collect;
pub mod commands;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod report;
pub mod restore;
pub mod snapshot;
pub mod storage;
