//! Failure types carried by deferred tasks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The error a deferred task was rejected with.
///
/// Cloning is cheap and every clone refers to the same underlying error, so one
/// rejection can be delivered to every listener and every `wait` caller.
#[derive(Clone)]
pub struct TaskError(Arc<anyhow::Error>);

impl TaskError {
    /// Create a task error from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Attempt to downcast to the concrete error the task failed with.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Whether two handles refer to the same rejection.
    pub fn same_as(&self, other: &TaskError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            write!(f, "{:#}", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Why `Deferred::wait` returned without a value.
#[derive(Debug, Clone, Error)]
pub enum WaitError {
    /// The deadline elapsed while the task was still pending. The task is untouched
    /// and may be waited on again.
    #[error("deferred task still pending after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The task settled as rejected.
    #[error(transparent)]
    Rejected(TaskError),
}

impl WaitError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::Timeout(_))
    }
}
