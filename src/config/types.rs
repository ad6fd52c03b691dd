//! Configuration defaults for corral.
//!
//! This module defines the constants and default value functions used by the
//! Config struct.

use std::path::PathBuf;

/// Environment variable naming a config file to load.
pub const CONFIG_ENV: &str = "CORRAL_CONFIG";

/// Environment variable overriding the lock directory.
pub const LOCK_DIR_ENV: &str = "CORRAL_LOCK_DIR";

/// Per-user config file location: `<config dir>/corral/config.yaml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("corral").join("config.yaml"))
}

pub fn default_lock_max_age_secs() -> u64 {
    3600
}

pub fn default_acquire_timeout_secs() -> u64 {
    30
}

pub fn default_poll_interval_ms() -> u64 {
    50
}

pub fn default_max_backoff_ms() -> u64 {
    1000
}

pub fn default_task_poll_interval_ms() -> u64 {
    20
}

pub fn default_refresh_interval_secs() -> u64 {
    60
}
