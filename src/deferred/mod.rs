//! Deferred tasks for long-running CLI operations.
//!
//! A [`Deferred`] is a handle to a value that becomes available later. Commands
//! wrap a unit of work in a closure, obtain a handle, and then combine handles
//! with [`Deferred::all`] / [`Deferred::race`] or block on them with
//! [`Deferred::wait`].
//!
//! # Scheduling
//!
//! The engine is cooperative: it never spawns threads. Work attached as an
//! executor advances only while a caller polls it, either directly through
//! [`Deferred::poll`] or through `wait`. Handles are `Send + Sync`, so a task can
//! also be settled from another thread; `wait` then sleeps on a condition
//! variable until settlement instead of polling.
//!
//! # Settlement
//!
//! A task settles at most once. Later `resolve`/`reject` calls are ignored.
//! Listeners fire exactly once, in registration order, followed by `finally`
//! listeners. A `wait` timeout reports [`WaitError::Timeout`] and leaves the task
//! pending.

mod combinators;
mod error;
mod handle;


// Re-export public API
pub use error::{TaskError, WaitError};
pub use handle::{Deferred, DeferredState};
