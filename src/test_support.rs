use crate::liveness::LivenessProbe;
use crate::locks::{LockConfig, LockDescriptor, LockManager, Owner};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Probe that reports every process alive.
pub(crate) struct AliveProbe;

impl LivenessProbe for AliveProbe {
    fn is_alive(&self, _pid: u32, _host: &str) -> bool {
        true
    }
}

/// Probe that reports every process dead.
pub(crate) struct DeadProbe;

impl LivenessProbe for DeadProbe {
    fn is_alive(&self, _pid: u32, _host: &str) -> bool {
        false
    }
}

/// Lock settings with short timings so contention tests finish quickly.
pub(crate) fn fast_lock_config(dir: &Path) -> LockConfig {
    LockConfig {
        lock_dir: dir.to_path_buf(),
        acquire_timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..LockConfig::default()
    }
}

/// A manager for the calling process over a fresh temporary lock directory.
pub(crate) fn temp_manager() -> (TempDir, LockManager) {
    let temp_dir = TempDir::new().unwrap();
    let manager = LockManager::new(fast_lock_config(temp_dir.path())).unwrap();
    (temp_dir, manager)
}

/// A manager posing as another live process on this host.
pub(crate) fn manager_as(dir: &Path, pid: u32) -> LockManager {
    LockManager::new(fast_lock_config(dir))
        .unwrap()
        .with_owner(Owner {
            pid,
            host: Owner::current().host,
        })
        .with_probe(AliveProbe)
}

/// Write `content` verbatim as the lock file of `name`.
pub(crate) fn write_raw_lock(manager: &LockManager, name: &str, content: &str) {
    std::fs::write(manager.lock_path(name), content).unwrap();
}

/// Write a lock file for `name` held by `owner`, acquired `age_secs` ago.
pub(crate) fn write_aged_lock(
    manager: &LockManager,
    name: &str,
    owner: &Owner,
    age_secs: f64,
) -> LockDescriptor {
    let mut descriptor = LockDescriptor::new(name, owner);
    descriptor.time -= age_secs;
    write_raw_lock(manager, name, &descriptor.to_json().unwrap());
    descriptor
}

/// Sets or removes an environment variable and restores it on drop.
///
/// Tests using this must be `#[serial]`.
pub(crate) struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    pub(crate) fn set(key: &'static str, value: impl AsRef<std::ffi::OsStr>) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: callers are #[serial], so no other test thread touches the environment.
        unsafe { std::env::set_var(key, value) };
        Self { key, original }
    }

    pub(crate) fn remove(key: &'static str) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: see `set`.
        unsafe { std::env::remove_var(key) };
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see `set`.
        unsafe {
            match &self.original {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }
}
