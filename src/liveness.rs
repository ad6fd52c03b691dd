//! Process liveness probing.
//!
//! The lock manager asks a [`LivenessProbe`] whether the process recorded in a
//! lock descriptor still exists before reclaiming the lock. Probing errs toward
//! "alive": a lock is only reclaimed for a dead owner when death is confirmed.
//!
//! - Remote hosts cannot be probed and are always reported alive.
//! - Unix sends the null signal with `kill(pid, 0)`. `ESRCH` means gone, `EPERM`
//!   means alive but owned by another user. Any other answer falls back to the
//!   `/proc` process table, and to "alive" when there is none.
//! - Windows asks `tasklist` for the PID and looks for it in the output.

use std::path::Path;

/// Decides whether a lock owner is still running.
pub trait LivenessProbe: Send + Sync {
    /// Whether process `pid` on `host` is (or may be) alive.
    fn is_alive(&self, pid: u32, host: &str) -> bool;
}

/// Probe backed by the operating system.
#[derive(Debug, Clone)]
pub struct SystemProbe {
    local_host: String,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::for_host(local_hostname())
    }

    /// Probe that treats `local_host` as this machine.
    pub fn for_host(local_host: impl Into<String>) -> Self {
        Self {
            local_host: local_host.into(),
        }
    }

    /// Whether `host` names this machine.
    pub fn is_local(&self, host: &str) -> bool {
        is_same_host(&self.local_host, host)
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl LivenessProbe for SystemProbe {
    fn is_alive(&self, pid: u32, host: &str) -> bool {
        if !self.is_local(host) {
            return true;
        }
        is_process_running(pid)
    }
}

/// Whether `host` refers to the machine named `local_host`.
pub fn is_same_host(local_host: &str, host: &str) -> bool {
    host.eq_ignore_ascii_case(local_host)
        || host.eq_ignore_ascii_case("localhost")
        || host == "127.0.0.1"
        || host == "::1"
}

/// Name of this machine, or `unknown` if it cannot be determined.
pub fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Whether a process with this PID exists on this machine.
pub fn is_process_running(pid: u32) -> bool {
    platform::is_running(pid)
}

/// Look the PID up in the `/proc` process table.
///
/// Returns `None` when this system has no procfs.
#[cfg_attr(windows, allow(dead_code))]
fn proc_table_lookup(pid: u32) -> Option<bool> {
    let proc_root = Path::new("/proc");
    if !proc_root.join("self").exists() {
        return None;
    }
    Some(proc_root.join(pid.to_string()).exists())
}

#[cfg(unix)]
mod platform {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    pub(super) fn is_running(pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return super::proc_table_lookup(pid).unwrap_or(true);
        };
        // kill(0, ..) addresses the whole process group, never a lock owner.
        if raw == 0 {
            return false;
        }

        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(Errno::ESRCH) => false,
            Err(errno) => {
                tracing::debug!(pid, %errno, "Null signal inconclusive, checking process table");
                super::proc_table_lookup(pid).unwrap_or(true)
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use std::process::Command;

    pub(super) fn is_running(pid: u32) -> bool {
        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH", "/FO", "CSV"])
            .output();

        match output {
            Ok(out) if out.status.success() => {
                let needle = format!("\"{}\"", pid);
                String::from_utf8_lossy(&out.stdout).contains(&needle)
            }
            Ok(out) => {
                tracing::debug!(pid, status = %out.status, "tasklist failed, assuming process is alive");
                true
            }
            Err(e) => {
                tracing::debug!(pid, error = %e, "tasklist unavailable, assuming process is alive");
                true
            }
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    pub(super) fn is_running(pid: u32) -> bool {
        super::proc_table_lookup(pid).unwrap_or(true)
    }
}
