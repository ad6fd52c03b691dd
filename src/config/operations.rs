//! Config loading, resolution, validation, and conversion.

use super::model::Config;
use super::types::{CONFIG_ENV, LOCK_DIR_ENV, user_config_path};
use crate::error::{CorralError, Result};
use crate::locks::{LockConfig, default_lock_dir};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(CorralError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            CorralError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| CorralError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            CorralError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Find and load the effective configuration.
    ///
    /// The first of these is used:
    /// 1. `explicit`, which must exist
    /// 2. the file named by `CORRAL_CONFIG`
    /// 3. the per-user `corral/config.yaml`, if present
    /// 4. defaults
    ///
    /// `CORRAL_LOCK_DIR` then overrides `lock_dir`.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = explicit {
            Self::load(path)?
        } else if let Some(path) = non_empty_env(CONFIG_ENV) {
            Self::load(PathBuf::from(path))?
        } else {
            match user_config_path() {
                Some(path) if path.is_file() => Self::load(&path)?,
                _ => Self::default(),
            }
        };

        if let Some(dir) = non_empty_env(LOCK_DIR_ENV) {
            config.lock_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_max_age_secs`, `poll_interval_ms`, `task_poll_interval_ms` and
    ///   `refresh_interval_secs` must be positive
    /// - `max_backoff_ms` must not be below `poll_interval_ms`
    /// - `refresh_interval_secs` must be below `lock_max_age_secs`
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("lock_max_age_secs", self.lock_max_age_secs),
            ("poll_interval_ms", self.poll_interval_ms),
            ("task_poll_interval_ms", self.task_poll_interval_ms),
            ("refresh_interval_secs", self.refresh_interval_secs),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(CorralError::UserError(format!(
                    "config validation failed: {} must be greater than 0",
                    key
                )));
            }
        }

        if self.max_backoff_ms < self.poll_interval_ms {
            return Err(CorralError::UserError(format!(
                "config validation failed: max_backoff_ms ({}) must not be less than poll_interval_ms ({})",
                self.max_backoff_ms, self.poll_interval_ms
            )));
        }

        // A holder must refresh before others may judge its lock stale.
        if self.refresh_interval_secs >= self.lock_max_age_secs {
            return Err(CorralError::UserError(format!(
                "config validation failed: refresh_interval_secs ({}) must be less than lock_max_age_secs ({})",
                self.refresh_interval_secs, self.lock_max_age_secs
            )));
        }

        Ok(())
    }

    /// Lock manager settings derived from this config.
    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            lock_dir: self.lock_dir.clone().unwrap_or_else(default_lock_dir),
            max_age: Duration::from_secs(self.lock_max_age_secs),
            acquire_timeout: Duration::from_secs(self.acquire_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

fn non_empty_env(key: &str) -> Option<OsString> {
    std::env::var_os(key).filter(|value| !value.is_empty())
}
