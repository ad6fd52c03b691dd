//! The lock manager: named, file-based mutual exclusion between processes.

use super::descriptor::{LockDescriptor, Owner};
use super::guard::LockGuard;
use super::naming::{LOCK_EXTENSION, lock_file_name};
use super::types::{LockConfig, LockInfo, LockStatus};
use crate::error::{CorralError, Result};
use crate::fs::{atomic_write, create_exclusive};
use crate::liveness::{LivenessProbe, SystemProbe, is_same_host};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What is on disk for one lock name.
enum LockFile {
    Missing,
    Corrupt,
    Present(LockDescriptor),
}

/// Serializes access to named resources across processes.
///
/// The lock directory is the only source of truth. The manager additionally
/// remembers the names it acquired and releases those it still owns when it
/// is dropped.
pub struct LockManager {
    config: LockConfig,
    owner: Owner,
    probe: Box<dyn LivenessProbe>,
    held: Mutex<BTreeSet<String>>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("config", &self.config)
            .field("owner", &self.owner)
            .field("held", &*self.held())
            .finish_non_exhaustive()
    }
}

impl LockManager {
    /// Create a manager, creating the lock directory if needed.
    ///
    /// Fails if the directory cannot be created.
    pub fn new(config: LockConfig) -> Result<Self> {
        fs::create_dir_all(&config.lock_dir).map_err(|e| {
            CorralError::UserError(format!(
                "failed to create lock directory '{}': {}",
                config.lock_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            config,
            owner: Owner::current(),
            probe: Box::new(SystemProbe::new()),
            held: Mutex::new(BTreeSet::new()),
        })
    }

    /// Replace the liveness probe used to judge local owners.
    pub fn with_probe(mut self, probe: impl LivenessProbe + 'static) -> Self {
        self.probe = Box::new(probe);
        self
    }

    /// Act as `owner` instead of the calling process.
    pub fn with_owner(mut self, owner: Owner) -> Self {
        self.owner = owner;
        self
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Path of the lock file for `name`.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.config.lock_dir.join(lock_file_name(name))
    }

    /// Names acquired through this manager and not yet released.
    pub fn held_locks(&self) -> Vec<String> {
        self.held().iter().cloned().collect()
    }

    /// Acquire the lock `name`.
    ///
    /// A stale holder is reclaimed once. If the lock is still contested and
    /// `blocking` is set, attempts are retried with doubling delays until
    /// `timeout` (or the configured acquire timeout) elapses. Returns whether
    /// the lock is now held by this manager.
    pub fn acquire(&self, name: &str, timeout: Option<Duration>, blocking: bool) -> bool {
        if self.attempt(name) {
            return true;
        }
        if !blocking {
            return false;
        }

        let timeout = timeout.unwrap_or(self.config.acquire_timeout);
        let deadline = Deadline::after(timeout);
        let mut delay = self.config.poll_interval;

        loop {
            let Some(remaining) = deadline.remaining() else {
                debug!(lock = name, timeout_ms = timeout.as_millis() as u64, "Gave up waiting for lock");
                return false;
            };
            thread::sleep(delay.min(remaining));

            if self.attempt(name) {
                return true;
            }
            delay = (delay * 2).min(self.config.max_backoff);
        }
    }

    /// Acquire the lock `name` only if it is free or stale.
    pub fn try_acquire(&self, name: &str) -> bool {
        self.acquire(name, None, false)
    }

    /// Acquire the lock `name`, waiting up to `timeout`, and return a guard
    /// that releases it when dropped.
    pub fn acquire_guard(&self, name: &str, timeout: Option<Duration>) -> Result<LockGuard<'_>> {
        if self.acquire(name, timeout, true) {
            Ok(LockGuard::new(self, name))
        } else {
            Err(self.contention_error(name))
        }
    }

    /// Non-blocking variant of [`acquire_guard`](Self::acquire_guard).
    pub fn try_acquire_guard(&self, name: &str) -> Result<LockGuard<'_>> {
        if self.try_acquire(name) {
            Ok(LockGuard::new(self, name))
        } else {
            Err(self.contention_error(name))
        }
    }

    /// Release the lock `name` if this manager owns it.
    ///
    /// Returns true if the lock file was removed or was already absent, false
    /// if another process owns it or removal failed.
    pub fn release(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        match self.read_lock(&path) {
            LockFile::Missing => {
                self.forget(name);
                true
            }
            LockFile::Present(d) if d.is_held_by(&self.owner) => {
                let removed = remove_lock_file(&path);
                if removed {
                    self.forget(name);
                    info!(lock = name, "Lock released");
                }
                removed
            }
            _ => {
                self.forget(name);
                debug!(lock = name, "Not releasing lock owned by another process");
                false
            }
        }
    }

    /// Remove the lock `name` regardless of its owner.
    ///
    /// Returns false only if the file exists and cannot be removed.
    pub fn force_release(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        let removed = remove_lock_file(&path);
        if removed {
            self.forget(name);
            info!(lock = name, "Lock force-released");
        }
        removed
    }

    /// Whether a live lock exists for `name`.
    ///
    /// A stale lock, including one with an unreadable descriptor, is removed
    /// and reported as not locked.
    pub fn is_locked(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        match self.read_lock(&path) {
            LockFile::Missing => false,
            LockFile::Corrupt => {
                self.reclaim(name, &path, None);
                false
            }
            LockFile::Present(d) => {
                if self.descriptor_is_stale(&d, self.config.max_age) {
                    self.reclaim(name, &path, Some(&d));
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Whether the lock `name` is stale under `max_age` (or the configured max age).
    ///
    /// A missing lock is not stale; an unreadable one always is.
    pub fn is_stale(&self, name: &str, max_age: Option<Duration>) -> bool {
        let max_age = max_age.unwrap_or(self.config.max_age);
        match self.read_lock(&self.lock_path(name)) {
            LockFile::Missing => false,
            LockFile::Corrupt => true,
            LockFile::Present(d) => self.descriptor_is_stale(&d, max_age),
        }
    }

    /// The descriptor of the lock `name`, if present and readable.
    pub fn lock_info(&self, name: &str) -> Option<LockDescriptor> {
        match self.read_lock(&self.lock_path(name)) {
            LockFile::Present(d) => Some(d),
            _ => None,
        }
    }

    /// Whether this manager's owner holds the lock `name`.
    pub fn owns_lock(&self, name: &str) -> bool {
        self.lock_info(name)
            .is_some_and(|d| d.is_held_by(&self.owner))
    }

    /// Restamp the acquisition time of an owned lock.
    ///
    /// Returns false, leaving the file untouched, if the lock is not owned.
    pub fn refresh(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        let LockFile::Present(mut descriptor) = self.read_lock(&path) else {
            return false;
        };
        if !descriptor.is_held_by(&self.owner) {
            return false;
        }

        descriptor.touch();
        let written = descriptor
            .to_json()
            .and_then(|json| atomic_write(&path, json.as_bytes()));
        match written {
            Ok(()) => {
                debug!(lock = name, "Lock refreshed");
                true
            }
            Err(e) => {
                warn!(lock = name, error = %e, "Failed to refresh lock");
                false
            }
        }
    }

    /// Current state of the lock `name`.
    ///
    /// A stale lock with a readable descriptor is reclaimed and reported as
    /// unlocked. An unreadable descriptor is reported as [`LockStatus::Unknown`]
    /// and left in place.
    pub fn lock_status(&self, name: &str) -> LockStatus {
        let path = self.lock_path(name);
        match self.read_lock(&path) {
            LockFile::Missing => LockStatus::Unlocked,
            LockFile::Corrupt => LockStatus::Unknown,
            LockFile::Present(d) => {
                if self.descriptor_is_stale(&d, self.config.max_age) {
                    self.reclaim(name, &path, Some(&d));
                    LockStatus::Unlocked
                } else {
                    LockStatus::Held(d)
                }
            }
        }
    }

    /// Block until the lock `name` is free or `timeout` elapses.
    ///
    /// Returns true if the lock was observed free.
    pub fn wait(&self, name: &str, timeout: Duration) -> bool {
        let deadline = Deadline::after(timeout);
        loop {
            if !self.is_locked(name) {
                return true;
            }
            let Some(remaining) = deadline.remaining() else {
                return false;
            };
            thread::sleep(self.config.poll_interval.min(remaining));
        }
    }

    /// Every lock file in the lock directory, sorted by name.
    ///
    /// Returns an empty list if the directory cannot be read.
    pub fn list_locks(&self) -> Vec<LockInfo> {
        self.scan(self.config.max_age)
    }

    /// Remove every stale lock, judging age against `max_age` (or the
    /// configured max age). Returns the number of locks removed.
    pub fn clear_stale(&self, max_age: Option<Duration>) -> usize {
        let max_age = max_age.unwrap_or(self.config.max_age);
        self.scan(max_age)
            .into_iter()
            .filter(|lock| lock.is_stale)
            .filter(|lock| self.reclaim(&lock.name, &lock.path, lock.descriptor.as_ref()))
            .count()
    }

    fn scan(&self, max_age: Duration) -> Vec<LockInfo> {
        let entries = match fs::read_dir(&self.config.lock_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    dir = %self.config.lock_dir.display(),
                    error = %e,
                    "Failed to read lock directory"
                );
                return Vec::new();
            }
        };

        let mut locks: Vec<LockInfo> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some(LOCK_EXTENSION))
            .filter_map(|path| {
                let stem = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                match self.read_lock(&path) {
                    LockFile::Missing => None,
                    LockFile::Corrupt => Some(LockInfo {
                        name: stem,
                        path,
                        descriptor: None,
                        is_stale: true,
                    }),
                    LockFile::Present(d) => Some(LockInfo {
                        name: d.name.clone(),
                        is_stale: self.descriptor_is_stale(&d, max_age),
                        path,
                        descriptor: Some(d),
                    }),
                }
            })
            .collect();

        locks.sort_by(|a, b| a.name.cmp(&b.name));
        locks
    }

    /// One acquisition attempt: create, or reclaim a stale holder and create once more.
    fn attempt(&self, name: &str) -> bool {
        let path = self.lock_path(name);
        let acquired = self.try_create(name, &path)
            || (self.reclaim_if_stale(name, &path) && self.try_create(name, &path));

        if acquired {
            self.held().insert(name.to_string());
            info!(lock = name, path = %path.display(), "Lock acquired");
        } else {
            debug!(lock = name, "Lock is held by another process");
        }
        acquired
    }

    fn try_create(&self, name: &str, path: &Path) -> bool {
        let descriptor = LockDescriptor::new(name, &self.owner);
        let json = match descriptor.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(lock = name, error = %e, "Failed to encode lock descriptor");
                return false;
            }
        };

        match create_exclusive(path, json.as_bytes()) {
            Ok(()) => true,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => false,
            Err(e) => {
                warn!(lock = name, path = %path.display(), error = %e, "Failed to create lock file");
                false
            }
        }
    }

    fn reclaim_if_stale(&self, name: &str, path: &Path) -> bool {
        match self.read_lock(path) {
            LockFile::Missing => true,
            LockFile::Corrupt => self.reclaim(name, path, None),
            LockFile::Present(d) => {
                self.descriptor_is_stale(&d, self.config.max_age)
                    && self.reclaim(name, path, Some(&d))
            }
        }
    }

    /// Delete a stale lock file, provided it still holds what was judged stale.
    ///
    /// Another process may replace the file between the re-read and the
    /// removal; that window is accepted.
    fn reclaim(&self, name: &str, path: &Path, expected: Option<&LockDescriptor>) -> bool {
        let unchanged = match (self.read_lock(path), expected) {
            (LockFile::Missing, _) => return true,
            (LockFile::Corrupt, None) => true,
            (LockFile::Present(current), Some(expected)) => current == *expected,
            _ => false,
        };
        if !unchanged {
            debug!(lock = name, "Lock changed since staleness check, not reclaiming");
            return false;
        }

        match expected {
            Some(d) => warn!(
                lock = name,
                pid = d.pid,
                host = %d.host,
                age = %d.age_string(),
                "Reclaiming stale lock"
            ),
            None => warn!(lock = name, "Reclaiming lock with unreadable descriptor"),
        }
        remove_lock_file(path)
    }

    fn descriptor_is_stale(&self, descriptor: &LockDescriptor, max_age: Duration) -> bool {
        if descriptor.is_older_than(max_age) {
            return true;
        }
        is_same_host(&self.owner.host, &descriptor.host)
            && !self.probe.is_alive(descriptor.pid, &descriptor.host)
    }

    fn read_lock(&self, path: &Path) -> LockFile {
        match fs::read_to_string(path) {
            Ok(content) => match LockDescriptor::parse(&content) {
                Ok(descriptor) => LockFile::Present(descriptor),
                Err(_) => LockFile::Corrupt,
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => LockFile::Missing,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Unreadable lock file");
                LockFile::Corrupt
            }
        }
    }

    fn contention_error(&self, name: &str) -> CorralError {
        CorralError::LockError(format!(
            "lock '{}' is held by another process ({})",
            name,
            self.lock_status(name)
        ))
    }

    fn held(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forget(&self, name: &str) {
        self.held().remove(name);
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        let held = std::mem::take(self.held.get_mut().unwrap_or_else(PoisonError::into_inner));
        for name in held {
            if !self.release(&name) {
                warn!(lock = %name, "Failed to release lock on shutdown");
            }
        }
    }
}

/// Remove a lock file. An already missing file counts as removed.
fn remove_lock_file(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove lock file");
            false
        }
    }
}

/// A point in time after which waiting stops. A timeout too large to
/// represent as an `Instant` never expires.
struct Deadline(Option<Instant>);

impl Deadline {
    fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// Time left before the deadline, or `None` once it has passed.
    fn remaining(&self) -> Option<Duration> {
        match self.0 {
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                (!left.is_zero()).then_some(left)
            }
            None => Some(Duration::MAX),
        }
    }
}
