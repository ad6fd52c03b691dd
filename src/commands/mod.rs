//! Command implementations for corral.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations after resolving the effective configuration.

mod lock;
mod run;

use crate::cli::{Cli, Command, LockAction, LockCommand};
use corral::config::Config;
use corral::error::Result;
use corral::locks::LockManager;

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. The `--config` and
/// `--lock-dir` flags are applied before any handler runs.
pub fn dispatch(cli: Cli) -> Result<()> {
    let mut config = Config::resolve(cli.config.as_deref())?;
    if let Some(lock_dir) = cli.lock_dir {
        config.lock_dir = Some(lock_dir);
    }

    match cli.command {
        Command::Run(args) => run::cmd_run(&config, args),
        Command::Lock(lock_cmd) => dispatch_lock(&config, lock_cmd),
    }
}

/// Dispatch lock subcommands.
fn dispatch_lock(config: &Config, lock_cmd: LockCommand) -> Result<()> {
    match lock_cmd.action {
        LockAction::List(args) => lock::cmd_lock_list(config, args),
        LockAction::Status(args) => lock::cmd_lock_status(config, args),
        LockAction::Clear(args) => lock::cmd_lock_clear(config, args),
        LockAction::ClearStale(args) => lock::cmd_lock_clear_stale(config, args),
        LockAction::Wait(args) => lock::cmd_lock_wait(config, args),
    }
}

fn open_manager(config: &Config) -> Result<LockManager> {
    LockManager::new(config.lock_config())
}
