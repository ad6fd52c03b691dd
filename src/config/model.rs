//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for corral.
///
/// This struct represents the contents of `config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Directory holding lock files (default: per-user cache dir).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_dir: Option<PathBuf>,

    /// Seconds after which a lock is considered stale.
    #[serde(default = "default_lock_max_age_secs")]
    pub lock_max_age_secs: u64,

    /// Seconds a blocking acquire waits for a contested lock.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// First delay between acquisition attempts, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Longest delay between acquisition attempts, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    // =========================================================================
    // Task settings
    // =========================================================================
    /// How often running tasks are polled, in milliseconds.
    #[serde(default = "default_task_poll_interval_ms")]
    pub task_poll_interval_ms: u64,

    /// How often a held lock is refreshed while tasks run, in seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_dir: None,
            lock_max_age_secs: default_lock_max_age_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            task_poll_interval_ms: default_task_poll_interval_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}
