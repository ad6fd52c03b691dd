//! RAII lock guard implementation.

use super::manager::LockManager;
use crate::error::{CorralError, Result};
use std::path::PathBuf;

/// RAII guard for a named lock.
///
/// When dropped, the lock is released through its manager. If release fails,
/// a warning is logged but no panic occurs.
#[derive(Debug)]
pub struct LockGuard<'a> {
    manager: &'a LockManager,

    /// Lock name as passed to the manager.
    name: String,

    /// Whether the lock has been released manually.
    released: bool,
}

impl<'a> LockGuard<'a> {
    pub(super) fn new(manager: &'a LockManager, name: &str) -> Self {
        Self {
            manager,
            name: name.to_string(),
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> PathBuf {
        self.manager.lock_path(&self.name)
    }

    /// Restamp the lock so long-running holders are not judged stale.
    pub fn refresh(&self) -> bool {
        self.manager.refresh(&self.name)
    }

    /// Manually release the lock.
    ///
    /// This is useful when you want to release the lock before the guard
    /// goes out of scope, and want to handle errors explicitly.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        if self.manager.release(&self.name) {
            Ok(())
        } else {
            Err(CorralError::UserError(format!(
                "failed to release lock '{}' at '{}'",
                self.name,
                self.path().display()
            )))
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if !self.released && !self.manager.release(&self.name) {
            tracing::warn!(lock = %self.name, "Failed to release lock");
        }
    }
}
