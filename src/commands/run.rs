//! Implementation of the `corral run` command.
//!
//! Each command becomes a child process wrapped in a [`Deferred`] whose executor
//! polls the child. The tasks are combined with `all` (or `race` for `--first`)
//! and waited on in slices; between slices the lock is refreshed so that a long
//! run is never judged stale by other processes.

use super::open_manager;
use crate::cli::RunArgs;
use anyhow::anyhow;
use corral::config::Config;
use corral::deferred::{Deferred, WaitError};
use corral::error::{CorralError, Result};
use corral::locks::LockGuard;
use serde_json::json;
use std::process::{Child, Command, ExitStatus};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A command that ran to a successful exit.
#[derive(Debug, Clone)]
struct Completed {
    command: String,
    status: ExitStatus,
}

/// A spawned command and the deferred task tracking it.
struct Task {
    command: String,
    child: Arc<Mutex<Child>>,
    deferred: Deferred<Completed>,
}

impl Task {
    fn spawn(command: &str) -> Result<Self> {
        let words = shell_words::split(command).map_err(|e| {
            CorralError::UserError(format!("invalid command '{}': {}", command, e))
        })?;
        let Some((program, rest)) = words.split_first() else {
            return Err(CorralError::UserError("empty command".to_string()));
        };

        let child = Command::new(program).args(rest).spawn().map_err(|e| {
            CorralError::UserError(format!("failed to start '{}': {}", command, e))
        })?;
        info!(pid = child.id(), command, "Started command");

        let child = Arc::new(Mutex::new(child));
        let polled = Arc::clone(&child);
        let label = command.to_string();
        let deferred = Deferred::with_executor(move || {
            let mut child = lock_child(&polled);
            match child.try_wait()? {
                None => Ok(None),
                Some(status) if status.success() => Ok(Some(Completed {
                    command: label.clone(),
                    status,
                })),
                Some(status) => Err(anyhow!("`{}` exited with {}", label, status)),
            }
        });

        Ok(Self {
            command: command.to_string(),
            child,
            deferred,
        })
    }

    /// Kill the child if it is still running.
    fn stop(&self) {
        let mut child = lock_child(&self.child);
        if let Ok(None) = child.try_wait() {
            warn!(pid = child.id(), command = %self.command, "Stopping command");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn cmd_run(config: &Config, args: RunArgs) -> Result<()> {
    let manager = open_manager(config)?;
    let guard = if args.no_wait {
        manager.try_acquire_guard(&args.lock)?
    } else {
        manager.acquire_guard(&args.lock, args.wait.map(Duration::from_secs))?
    };

    let mut tasks = Vec::with_capacity(args.commands.len());
    for command in &args.commands {
        match Task::spawn(command) {
            Ok(task) => tasks.push(task),
            Err(e) => {
                tasks.iter().for_each(Task::stop);
                return Err(e);
            }
        }
    }

    let timeout = args.timeout.map(Duration::from_secs);
    let outcome = if args.first {
        let first = Deferred::race(tasks.iter().map(|t| t.deferred.clone()));
        supervise(&first, &guard, config, timeout).map(|done| vec![done])
    } else {
        let every = Deferred::all(tasks.iter().enumerate().map(|(i, t)| (i, t.deferred.clone())));
        supervise(&every, &guard, config, timeout)
            .map(|done| done.into_iter().map(|(_, completed)| completed).collect())
    };

    tasks.iter().for_each(Task::stop);
    let completed = outcome?;
    guard.release()?;

    for done in &completed {
        println!("Finished '{}' ({})", done.command, done.status);
    }
    Ok(())
}

/// Wait for `outcome` in refresh-sized slices, keeping the lock fresh.
fn supervise<R>(
    outcome: &Deferred<R>,
    guard: &LockGuard<'_>,
    config: &Config,
    timeout: Option<Duration>,
) -> Result<R>
where
    R: Clone + Send + 'static,
{
    let started = Instant::now();
    let lock_name = guard.name().to_string();
    outcome.on_progress(move |beat| info!(lock = %lock_name, %beat, "Commands still running"));

    loop {
        let remaining = timeout.map(|limit| limit.saturating_sub(started.elapsed()));
        if remaining == Some(Duration::ZERO) {
            return Err(CorralError::TimeoutError(format!(
                "commands still running after {}s",
                timeout.unwrap_or_default().as_secs()
            )));
        }
        let slice = remaining.map_or(config.refresh_interval(), |r| r.min(config.refresh_interval()));

        match outcome.wait(config.task_poll_interval(), Some(slice)) {
            Ok(value) => return Ok(value),
            Err(WaitError::Timeout(_)) => {
                if !guard.refresh() {
                    warn!(lock = guard.name(), "Lock is no longer held by this process");
                }
                outcome.progress(json!({ "elapsed_secs": started.elapsed().as_secs() }));
            }
            Err(err) => return Err(err.into()),
        }
    }
}
