//! The `Deferred` handle: settlement, listeners, progress and waiting.

use super::error::{TaskError, WaitError};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

pub(super) type Outcome<T> = Result<T, TaskError>;
pub(super) type Executor<T> = Box<dyn FnMut() -> Outcome<Option<T>> + Send>;

type FulfilledListener<T> = Box<dyn FnOnce(&T) + Send>;
type RejectedListener = Box<dyn FnOnce(&TaskError) + Send>;
type SettledListener<T> = Box<dyn FnOnce(&Outcome<T>) + Send>;
type ProgressListener = Box<dyn FnMut(&Value) + Send>;

/// Observable state of a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredState {
    Pending,
    Fulfilled,
    Rejected,
}

/// A value that becomes available later.
///
/// A `Deferred` settles at most once, either fulfilled with a value or rejected
/// with a [`TaskError`]. Listeners registered with [`then`](Self::then),
/// [`catch`](Self::catch) and [`finally`](Self::finally) run exactly once, in
/// registration order, on the thread that settles the task. Listeners registered
/// after settlement run immediately.
///
/// An optional executor is polled by [`wait`](Self::wait) (or [`poll`](Self::poll));
/// returning `Ok(Some(value))` fulfills the task and returning `Err` rejects it.
/// Nothing runs in the background: a task with an executor only makes progress
/// while somebody polls it.
///
/// Handles are cheap to clone and every clone observes the same task.
pub struct Deferred<T> {
    shared: Arc<Shared<T>>,
}

pub(super) struct Shared<T> {
    inner: Mutex<Inner<T>>,
    settled: Condvar,
}

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    on_fulfilled: Vec<FulfilledListener<T>>,
    on_rejected: Vec<RejectedListener>,
    on_settled: Vec<SettledListener<T>>,
    on_progress: Vec<ProgressListener>,
    executor: Option<Executor<T>>,
    /// The executor is out of `executor` and running on some thread.
    polling: bool,
    /// A poll arrived while `polling`; the running poll must go round again.
    repoll: bool,
    created_at: Instant,
    timeout: Option<Duration>,
}

impl<T> Inner<T> {
    fn state(&self) -> DeferredState {
        match &self.outcome {
            None => DeferredState::Pending,
            Some(Ok(_)) => DeferredState::Fulfilled,
            Some(Err(_)) => DeferredState::Rejected,
        }
    }
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Deferred")
            .field("state", &inner.state())
            .field("has_executor", &inner.executor.is_some())
            .field("age", &inner.created_at.elapsed())
            .finish()
    }
}

impl<T> Deferred<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> DeferredState {
        self.lock().state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == DeferredState::Pending
    }

    /// Time since the task was created.
    pub fn age(&self) -> Duration {
        self.lock().created_at.elapsed()
    }

    pub(super) fn downgrade(&self) -> Weak<Shared<T>> {
        Arc::downgrade(&self.shared)
    }

    pub(super) fn upgrade(weak: &Weak<Shared<T>>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }
}

impl<T: Clone + Send + 'static> Deferred<T> {
    /// Create a pending task that is settled by calling `resolve` or `reject`.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a pending task whose executor is polled by `wait`.
    pub fn with_executor<F>(mut executor: F) -> Self
    where
        F: FnMut() -> anyhow::Result<Option<T>> + Send + 'static,
    {
        Self::build(Some(Box::new(move || executor().map_err(TaskError::from))))
    }

    pub(super) fn from_executor(executor: Executor<T>) -> Self {
        Self::build(Some(executor))
    }

    fn build(executor: Option<Executor<T>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    outcome: None,
                    on_fulfilled: Vec::new(),
                    on_rejected: Vec::new(),
                    on_settled: Vec::new(),
                    on_progress: Vec::new(),
                    executor,
                    polling: false,
                    repoll: false,
                    created_at: Instant::now(),
                    timeout: None,
                }),
                settled: Condvar::new(),
            }),
        }
    }

    /// Set the timeout `wait` uses when called without one.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.lock().timeout = Some(timeout);
        self
    }

    /// A task that is already fulfilled.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.resolve(value);
        deferred
    }

    /// A task that is already rejected.
    pub fn rejected(error: impl Into<TaskError>) -> Self {
        let deferred = Self::new();
        deferred.reject(error);
        deferred
    }

    /// Fulfill the task. Returns `false` (and does nothing) if it already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject the task. Returns `false` (and does nothing) if it already settled.
    pub fn reject(&self, error: impl Into<TaskError>) -> bool {
        self.settle(Err(error.into()))
    }

    pub(super) fn settle(&self, outcome: Outcome<T>) -> bool {
        let (fulfilled, rejected, settled) = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome.clone());
            inner.executor = None;
            inner.polling = false;
            inner.repoll = false;
            (
                std::mem::take(&mut inner.on_fulfilled),
                std::mem::take(&mut inner.on_rejected),
                std::mem::take(&mut inner.on_settled),
            )
        };
        self.shared.settled.notify_all();

        match &outcome {
            Ok(value) => fulfilled.into_iter().for_each(|listener| listener(value)),
            Err(error) => rejected.into_iter().for_each(|listener| listener(error)),
        }
        settled.into_iter().for_each(|listener| listener(&outcome));
        true
    }

    /// The settled outcome, or `None` while pending.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.lock().outcome.clone()
    }

    fn subscribe(&self, on_fulfilled: FulfilledListener<T>, on_rejected: RejectedListener) {
        let mut inner = self.lock();
        let Some(outcome) = inner.outcome.clone() else {
            inner.on_fulfilled.push(on_fulfilled);
            inner.on_rejected.push(on_rejected);
            return;
        };
        drop(inner);
        match outcome {
            Ok(value) => on_fulfilled(&value),
            Err(error) => on_rejected(&error),
        }
    }

    pub(super) fn subscribe_settled(&self, listener: SettledListener<T>) {
        let mut inner = self.lock();
        let Some(outcome) = inner.outcome.clone() else {
            inner.on_settled.push(listener);
            return;
        };
        drop(inner);
        listener(&outcome);
    }

    /// Chain a transformation of the fulfilled value.
    ///
    /// A rejection of this task rejects the returned task with the same error.
    pub fn then<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(f(value)))
    }

    /// Chain a fallible transformation of the fulfilled value.
    pub fn and_then<U, F>(&self, f: F) -> Deferred<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        let next = Deferred::new();
        let on_value = next.clone();
        let on_error = next.clone();
        self.subscribe(
            Box::new(move |value: &T| {
                match f(value.clone()) {
                    Ok(mapped) => on_value.resolve(mapped),
                    Err(err) => on_value.reject(err),
                };
            }),
            Box::new(move |error: &TaskError| {
                on_error.reject(error.clone());
            }),
        );
        next
    }

    /// Recover from a rejection. A fulfilled value passes through unchanged.
    pub fn catch<F>(&self, f: F) -> Deferred<T>
    where
        F: FnOnce(&TaskError) -> T + Send + 'static,
    {
        let next = Deferred::new();
        let on_value = next.clone();
        let on_error = next.clone();
        self.subscribe(
            Box::new(move |value: &T| {
                on_value.resolve(value.clone());
            }),
            Box::new(move |error: &TaskError| {
                on_error.resolve(f(error));
            }),
        );
        next
    }

    /// Run `f` once the task settles either way.
    ///
    /// Finally listeners run after every fulfillment/rejection listener. The
    /// returned task settles exactly like this one, after `f` has run.
    pub fn finally<F>(&self, f: F) -> Deferred<T>
    where
        F: FnOnce() + Send + 'static,
    {
        let next = Deferred::new();
        let chained = next.clone();
        self.subscribe_settled(Box::new(move |outcome| {
            f();
            chained.settle(outcome.clone());
        }));
        next
    }

    /// Register a progress listener. Progress never affects settlement.
    pub fn on_progress<F>(&self, listener: F) -> &Self
    where
        F: FnMut(&Value) + Send + 'static,
    {
        self.lock().on_progress.push(Box::new(listener));
        self
    }

    /// Notify every progress listener, in registration order.
    pub fn progress(&self, value: impl Into<Value>) {
        let value = value.into();
        let mut listeners = std::mem::take(&mut self.lock().on_progress);
        for listener in listeners.iter_mut() {
            listener(&value);
        }
        // Listeners registered while we were notifying go after the existing ones.
        let mut inner = self.lock();
        listeners.append(&mut inner.on_progress);
        inner.on_progress = listeners;
    }

    /// Run the executor if the task is still pending.
    ///
    /// A poll that arrives while another poll holds the executor (for example a
    /// member settling inside an aggregate's executor) is not dropped: the
    /// running poll executes once more before parking the executor again.
    pub fn poll(&self) -> DeferredState {
        let mut executor = {
            let mut inner = self.lock();
            if inner.outcome.is_some() {
                return inner.state();
            }
            match inner.executor.take() {
                Some(executor) => {
                    inner.polling = true;
                    inner.repoll = false;
                    executor
                }
                None => {
                    if inner.polling {
                        inner.repoll = true;
                    }
                    return DeferredState::Pending;
                }
            }
        };

        loop {
            match executor() {
                Ok(Some(value)) => {
                    self.resolve(value);
                }
                Ok(None) => {
                    let mut inner = self.lock();
                    if inner.outcome.is_none() {
                        if std::mem::take(&mut inner.repoll) {
                            continue;
                        }
                        inner.polling = false;
                        inner.executor = Some(executor);
                    }
                }
                Err(error) => {
                    self.reject(error);
                }
            }
            break;
        }
        self.state()
    }

    fn has_executor(&self) -> bool {
        self.lock().executor.is_some()
    }

    /// Block until the task settles or `timeout` elapses.
    ///
    /// A settled task returns immediately. A pending task with an executor has it
    /// polled every `poll_interval`; without an executor the caller sleeps until
    /// another party settles the task. On timeout the task stays pending. With no
    /// timeout (here or via [`with_timeout`](Self::with_timeout)) a task that never
    /// settles blocks forever.
    pub fn wait(&self, poll_interval: Duration, timeout: Option<Duration>) -> Result<T, WaitError> {
        let timeout = timeout.or(self.lock().timeout);
        let started = Instant::now();

        loop {
            let driven = self.has_executor();
            if driven {
                self.poll();
            }
            if let Some(outcome) = self.outcome() {
                return outcome.map_err(WaitError::Rejected);
            }

            let pause = match timeout {
                Some(limit) => {
                    let elapsed = started.elapsed();
                    if elapsed >= limit {
                        return Err(WaitError::Timeout(limit));
                    }
                    poll_interval.min(limit - elapsed)
                }
                None => poll_interval,
            };

            if driven {
                thread::sleep(pause);
            } else {
                let inner = self.lock();
                if inner.outcome.is_none() {
                    let _ = self.shared.settled.wait_timeout(inner, pause);
                }
            }
        }
    }
}
