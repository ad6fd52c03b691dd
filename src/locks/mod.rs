//! File-based named locks shared between processes on one host.
//!
//! # Lock Files
//!
//! Each named lock is a file `<sanitized-name>.lock` in the lock directory.
//! It is published with exclusive-create semantics, so only one process can
//! hold a given lock at a time, and it is rewritten only by whole-file
//! replacement.
//!
//! # Lock Descriptors
//!
//! Each lock file contains a JSON [`LockDescriptor`]:
//! - `name`: the lock name as given, before sanitization
//! - `pid` / `host`: identity of the holder
//! - `time`: Unix timestamp of acquisition or last refresh
//! - `user`, `command`, `version`, `os`: diagnostics
//!
//! # Staleness
//!
//! A lock is stale when its descriptor cannot be read, when it is older than
//! the configured max age, or when its holder ran on this host and is no
//! longer alive. Stale locks are reclaimed by `acquire`, `is_locked`,
//! `lock_status` and `clear_stale`. Holders on other hosts cannot be probed
//! and are assumed alive until the max age passes.
//!
//! # RAII Guards
//!
//! [`LockManager::acquire_guard`] returns a [`LockGuard`] that releases the
//! lock when dropped. Dropping the manager releases every lock it still holds.

mod descriptor;
mod guard;
mod manager;
mod naming;
mod types;

#[cfg(test)]
mod tests;

pub use descriptor::{LockDescriptor, Owner};
pub use guard::LockGuard;
pub use manager::LockManager;
pub use naming::{lock_file_name, sanitize_name};
pub use types::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_MAX_AGE, DEFAULT_MAX_BACKOFF, DEFAULT_POLL_INTERVAL,
    LockConfig, LockInfo, LockStatus, default_lock_dir,
};
