//! Filesystem utilities for corral.
//!
//! Lock files are shared between processes, so they are only ever published
//! or replaced as whole files.

pub mod atomic;

pub use atomic::{atomic_write, create_exclusive};
