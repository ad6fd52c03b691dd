//! Corral: deferred tasks and file-based process locks for command-line tools.
//!
//! Two independent pieces make up the coordination core:
//!
//! - [`deferred`]: a settle-once deferred value with ordered callbacks,
//!   progress notification, `all`/`race` combinators and a blocking `wait`.
//! - [`locks`]: named locks backed by files in a lock directory, with
//!   ownership, staleness and [`liveness`] probing of the holding process.
//!
//! A command wraps long work in a [`Deferred`](deferred::Deferred), takes a
//! named lock from a [`LockManager`](locks::LockManager) around any shared
//! mutation, and reports failures through [`CorralError`](error::CorralError)
//! and its documented exit codes.

pub mod config;
pub mod deferred;
pub mod error;
pub mod exit_codes;
pub mod fs;
pub mod liveness;
pub mod locks;
pub mod logging;

#[cfg(test)]
mod test_support;
