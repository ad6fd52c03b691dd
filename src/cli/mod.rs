//! CLI argument parsing for corral.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Corral: run commands under named, host-wide locks.
///
/// Locks are files in a shared lock directory. A lock held by a process that
/// has exited, or older than the configured max age, is reclaimed.
#[derive(Parser, Debug)]
#[command(name = "corral")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file to load instead of the default locations.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Lock directory, overriding config and CORRAL_LOCK_DIR.
    #[arg(long, global = true, value_name = "DIR")]
    pub lock_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for corral.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or more commands while holding a named lock.
    ///
    /// Exits 4 if the lock is held elsewhere, 2 if a command fails and
    /// 3 if --timeout elapses.
    Run(RunArgs),

    /// Lock management commands.
    ///
    /// List, inspect, wait for or clear locks.
    Lock(LockCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Name of the lock to hold while the commands run.
    #[arg(short, long)]
    pub lock: String,

    /// Seconds to wait for the lock (default: acquire_timeout_secs from config).
    #[arg(long, value_name = "SECS", conflicts_with = "no_wait")]
    pub wait: Option<u64>,

    /// Fail immediately if the lock is held.
    #[arg(long)]
    pub no_wait: bool,

    /// Seconds after which remaining commands are killed.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Finish as soon as the first command finishes.
    #[arg(long)]
    pub first: bool,

    /// Commands to run; each is split into words like a shell would.
    #[arg(required = true, num_args = 1.., value_name = "COMMAND")]
    pub commands: Vec<String>,
}

/// Arguments for the `lock` command.
#[derive(Parser, Debug)]
pub struct LockCommand {
    #[command(subcommand)]
    pub action: LockAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LockAction {
    /// List all locks.
    ///
    /// Shows each lock's holder and age, and marks stale locks.
    List(LockListArgs),

    /// Show whether a lock is held, and by whom.
    Status(LockNameArgs),

    /// Clear a specific lock.
    ///
    /// Requires --force flag to prevent accidental clearing.
    Clear(LockClearArgs),

    /// Remove all stale locks.
    ClearStale(LockClearStaleArgs),

    /// Wait until a lock is free.
    Wait(LockWaitArgs),
}

/// Arguments for the `lock list` command.
#[derive(Parser, Debug)]
pub struct LockListArgs {
    /// Only show locks whose name matches this glob.
    #[arg(long = "match", value_name = "GLOB")]
    pub pattern: Option<String>,
}

/// Arguments naming a single lock.
#[derive(Parser, Debug)]
pub struct LockNameArgs {
    /// Lock name.
    pub name: String,
}

/// Arguments for the `lock clear` command.
#[derive(Parser, Debug)]
pub struct LockClearArgs {
    /// Lock name.
    pub name: String,

    /// Force clearing the lock (required for safety).
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `lock clear-stale` command.
#[derive(Parser, Debug)]
pub struct LockClearStaleArgs {
    /// Treat locks older than this many seconds as stale (default: from config).
    #[arg(long, value_name = "SECS")]
    pub max_age: Option<u64>,
}

/// Arguments for the `lock wait` command.
#[derive(Parser, Debug)]
pub struct LockWaitArgs {
    /// Lock name.
    pub name: String,

    /// Seconds to wait before giving up.
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub timeout: u64,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
