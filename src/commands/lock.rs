//! Implementation of the `corral lock` subcommands.

use super::open_manager;
use crate::cli::{LockClearArgs, LockClearStaleArgs, LockListArgs, LockNameArgs, LockWaitArgs};
use corral::config::Config;
use corral::error::{CorralError, Result};
use corral::locks::{LockInfo, LockManager, LockStatus};
use globset::{Glob, GlobMatcher};
use std::time::Duration;

pub fn cmd_lock_list(config: &Config, args: LockListArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let locks = matching_locks(&manager, args.pattern.as_deref())?;
    for line in render_lock_list(&locks, config.lock_max_age_secs) {
        println!("{}", line);
    }
    Ok(())
}

/// Locks in the directory, keeping only names that match `pattern`.
fn matching_locks(manager: &LockManager, pattern: Option<&str>) -> Result<Vec<LockInfo>> {
    let matcher = pattern.map(build_matcher).transpose()?;
    Ok(manager
        .list_locks()
        .into_iter()
        .filter(|lock| matcher.as_ref().is_none_or(|m| m.is_match(&lock.name)))
        .collect())
}

fn render_lock_list(locks: &[LockInfo], max_age_secs: u64) -> Vec<String> {
    if locks.is_empty() {
        return vec!["No active locks.".to_string()];
    }

    let mut lines = vec![format!("Active locks ({}):", locks.len()), String::new()];

    for lock in locks {
        lines.push(format!("  {}:", lock.name));
        match &lock.descriptor {
            Some(d) => {
                lines.push(format!("    PID:        {}", d.pid));
                lines.push(format!("    Host:       {}", d.host));
                if !d.user.is_empty() {
                    lines.push(format!("    User:       {}", d.user));
                }
                lines.push(format!(
                    "    Acquired:   {}",
                    d.acquired_at().format("%Y-%m-%d %H:%M:%S UTC")
                ));
                lines.push(format!("    Age:        {}", d.age_string()));
                if !d.command.is_empty() {
                    lines.push(format!("    Command:    {}", d.command));
                }
            }
            None => lines.push("    Info:       unreadable lock file".to_string()),
        }
        if lock.is_stale {
            lines.push(format!(
                "    Status:     STALE (reclaimable; max age {}s)",
                max_age_secs
            ));
        }
        lines.push(format!("    Path:       {}", lock.path.display()));
        lines.push(String::new());
    }

    // Summary
    let stale_count = locks.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        lines.push(format!(
            "{} stale lock(s) found. Use `corral lock clear-stale` to remove them.",
            stale_count
        ));
    }

    lines
}

pub fn cmd_lock_status(config: &Config, args: LockNameArgs) -> Result<()> {
    let manager = open_manager(config)?;
    println!("{}", status_line(&manager, &args.name));
    Ok(())
}

fn status_line(manager: &LockManager, name: &str) -> String {
    format!("{}: {}", name, manager.lock_status(name))
}

pub fn cmd_lock_clear(config: &Config, args: LockClearArgs) -> Result<()> {
    // Require --force flag
    if !args.force {
        return Err(CorralError::UserError(format!(
            "refusing to clear lock without --force flag.\n\n\
             Clearing a lock lets another process run while the holder may still be active.\n\
             Only clear locks if you are certain the lock holder has crashed.\n\n\
             To clear the lock, run:\n  corral lock clear {} --force",
            args.name
        )));
    }

    let manager = open_manager(config)?;
    println!("{}", clear_lock(&manager, &args.name)?);
    Ok(())
}

/// Force-remove the lock `name` and describe what was removed.
fn clear_lock(manager: &LockManager, name: &str) -> Result<String> {
    let path = manager.lock_path(name);
    if !path.exists() {
        return Ok(format!("Lock '{}' is not held.", name));
    }

    // Read without reclaiming so a stale holder is still described.
    let status = manager
        .lock_info(name)
        .map_or(LockStatus::Unknown, LockStatus::Held);
    if !manager.force_release(name) {
        return Err(CorralError::UserError(format!(
            "failed to remove lock file '{}'",
            path.display()
        )));
    }

    Ok(format!("Cleared lock '{}' ({}).", name, status))
}

pub fn cmd_lock_clear_stale(config: &Config, args: LockClearStaleArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let cleared = manager.clear_stale(args.max_age.map(Duration::from_secs));

    if cleared == 0 {
        println!("No stale locks.");
    } else {
        println!("Cleared {} stale lock(s).", cleared);
    }
    Ok(())
}

pub fn cmd_lock_wait(config: &Config, args: LockWaitArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let timeout = Duration::from_secs(args.timeout);

    if manager.wait(&args.name, timeout) {
        println!("Lock '{}' is free.", args.name);
        Ok(())
    } else {
        Err(CorralError::TimeoutError(format!(
            "lock '{}' still held after {}s ({})",
            args.name,
            args.timeout,
            manager.lock_status(&args.name)
        )))
    }
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher> {
    Glob::new(pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CorralError::UserError(format!("invalid --match pattern '{}': {}", pattern, e)))
}
