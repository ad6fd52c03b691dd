//! Lock configuration and reporting types.

use super::descriptor::LockDescriptor;
use std::path::PathBuf;
use std::time::Duration;

/// Default age after which a lock is considered stale.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Default time a blocking acquire waits for a contested lock.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default first retry delay of a blocking acquire.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default cap on the retry delay of a blocking acquire.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Settings of a [`LockManager`](super::LockManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Directory holding the lock files.
    pub lock_dir: PathBuf,

    /// Age after which a lock is stale regardless of its owner.
    pub max_age: Duration,

    /// Timeout used by `acquire` when the caller passes none.
    pub acquire_timeout: Duration,

    /// First delay between acquisition attempts; doubles after each miss.
    pub poll_interval: Duration,

    /// Longest delay between acquisition attempts.
    pub max_backoff: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            max_age: DEFAULT_MAX_AGE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl LockConfig {
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Per-user lock directory: `<cache dir>/corral/locks`, or under the temp dir
/// when the platform has no cache dir.
pub fn default_lock_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("corral")
        .join("locks")
}

/// Information about a lock file found in the lock directory.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// Lock name; the original name when the descriptor is readable,
    /// otherwise the sanitized file stem.
    pub name: String,

    /// The lock file path.
    pub path: PathBuf,

    /// The parsed descriptor, or `None` if the file is corrupt.
    pub descriptor: Option<LockDescriptor>,

    /// Whether the lock is stale.
    pub is_stale: bool,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stale = if self.is_stale { ", STALE" } else { "" };
        match &self.descriptor {
            Some(d) => write!(
                f,
                "{} (pid: {}, host: {}, age: {}{})",
                self.name,
                d.pid,
                d.host,
                d.age_string(),
                stale
            ),
            None => write!(f, "{} (no info available{})", self.name, stale),
        }
    }
}

/// Current state of a named lock.
#[derive(Debug, Clone, PartialEq)]
pub enum LockStatus {
    /// No live lock file exists.
    Unlocked,
    /// A lock file exists but its descriptor cannot be read.
    Unknown,
    /// Held by the described process.
    Held(LockDescriptor),
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        !matches!(self, LockStatus::Unlocked)
    }
}

impl std::fmt::Display for LockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockStatus::Unlocked => write!(f, "Not locked"),
            LockStatus::Unknown => write!(f, "Locked (no info available)"),
            LockStatus::Held(d) => write!(
                f,
                "Locked by PID {} on {} since {}",
                d.pid,
                d.host,
                d.age_string()
            ),
        }
    }
}
