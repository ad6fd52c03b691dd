//! Lock descriptors: the JSON record stored in every lock file.

use crate::error::{CorralError, Result};
use crate::liveness::local_hostname;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identity of a lock holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub pid: u32,
    pub host: String,
}

impl Owner {
    /// The calling process on this machine.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            host: local_hostname(),
        }
    }
}

/// Lock descriptor stored in lock files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockDescriptor {
    /// Lock name as given by the caller, before sanitization.
    pub name: String,

    /// Process ID of the lock holder.
    pub pid: u32,

    /// Host the lock holder runs on.
    pub host: String,

    /// Unix timestamp (seconds, millisecond precision) of acquisition or last refresh.
    pub time: f64,

    /// User running the lock holder.
    #[serde(default)]
    pub user: String,

    /// Command line of the lock holder.
    #[serde(default)]
    pub command: String,

    /// Version of corral that wrote the lock.
    #[serde(default)]
    pub version: String,

    /// Operating system of the lock holder.
    #[serde(default)]
    pub os: String,
}

impl LockDescriptor {
    /// Create a descriptor for `owner` holding `name`, stamped now.
    pub fn new(name: &str, owner: &Owner) -> Self {
        Self {
            name: name.to_string(),
            pid: owner.pid,
            host: owner.host.clone(),
            time: unix_now(),
            user: current_user(),
            command: current_command_line(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
        }
    }

    /// Parse a descriptor from JSON.
    pub fn parse(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| CorralError::UserError(format!("failed to parse lock descriptor: {}", e)))
    }

    /// Serialize the descriptor to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CorralError::UserError(format!("failed to serialize lock descriptor: {}", e))
        })
    }

    /// When the lock was acquired or last refreshed.
    pub fn acquired_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis((self.time * 1000.0).round() as i64).unwrap_or_default()
    }

    /// Seconds since acquisition. Never negative, even with clock skew.
    pub fn age_secs(&self) -> f64 {
        (unix_now() - self.time).max(0.0)
    }

    /// Whether more than `max_age` has passed since acquisition.
    pub fn is_older_than(&self, max_age: Duration) -> bool {
        self.age_secs() > max_age.as_secs_f64()
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let total = self.age_secs() as u64;
        let days = total / 86_400;
        let hours = total / 3_600;
        let minutes = total / 60;
        let seconds = total % 60;

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Whether `owner` is the recorded holder.
    pub fn is_held_by(&self, owner: &Owner) -> bool {
        self.pid == owner.pid && self.host == owner.host
    }

    /// Restamp the acquisition time to now.
    pub fn touch(&mut self) {
        self.time = unix_now();
    }
}

/// Current time as fractional Unix seconds with millisecond precision.
pub(crate) fn unix_now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn current_command_line() -> String {
    shell_words::join(std::env::args())
}
