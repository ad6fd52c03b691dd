//! Error types for corral.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::deferred::WaitError;
use crate::exit_codes;
use thiserror::Error;

/// Main error type for corral operations.
///
/// Each variant maps to a documented exit code so commands built on the
/// coordination core can report "another instance is running" or "timed out"
/// distinctly from their own failures.
#[derive(Error, Debug)]
pub enum CorralError {
    /// Invalid arguments, invalid configuration, or an unusable lock directory.
    #[error("{0}")]
    UserError(String),

    /// A named lock could not be acquired.
    #[error("Lock acquisition failed: {0}")]
    LockError(String),

    /// A deferred task reported its own failure.
    #[error("Task failed: {0}")]
    TaskError(String),

    /// A deadline elapsed before the awaited work completed.
    #[error("Timed out: {0}")]
    TimeoutError(String),
}

impl CorralError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            CorralError::UserError(_) => exit_codes::USER_ERROR,
            CorralError::LockError(_) => exit_codes::LOCK_FAILURE,
            CorralError::TaskError(_) => exit_codes::TASK_FAILURE,
            CorralError::TimeoutError(_) => exit_codes::TIMEOUT,
        }
    }
}

impl From<WaitError> for CorralError {
    fn from(err: WaitError) -> Self {
        match err {
            WaitError::Timeout(_) => CorralError::TimeoutError(err.to_string()),
            WaitError::Rejected(task_err) => CorralError::TaskError(format!("{:#}", task_err)),
        }
    }
}

/// Result type alias for corral operations.
pub type Result<T> = std::result::Result<T, CorralError>;
