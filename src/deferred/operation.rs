//! AsyncOperation implementation
//!
//! Mutex-guarded slot plus a condvar for blocking waiters.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, StrataError};

/// Observable state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Succeeded,
    Failed,
}

type Continuation<T, E> = Box<dyn FnOnce(&std::result::Result<T, E>) + Send + 'static>;

enum Slot<T, E> {
    /// Continuations in registration order
    Pending(Vec<Continuation<T, E>>),
    Done(Arc<std::result::Result<T, E>>),
}

struct Inner<T, E> {
    slot: Mutex<Slot<T, E>>,
    done: Condvar,
}

/// Eventual outcome of one asynchronous operation
///
/// Cloning yields another handle to the same cell.
pub struct AsyncOperation<T, E> {
    inner: Arc<Inner<T, E>>,
}

impl<T, E> Clone for AsyncOperation<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, E> AsyncOperation<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Create a pending operation
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Pending(Vec::new())),
                done: Condvar::new(),
            }),
        }
    }

    /// Create an operation that has already succeeded
    pub fn succeeded(value: T) -> Self {
        Self::resolved(Ok(value))
    }

    /// Create an operation that has already failed
    pub fn failed(error: E) -> Self {
        Self::resolved(Err(error))
    }

    fn resolved(outcome: std::result::Result<T, E>) -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Done(Arc::new(outcome))),
                done: Condvar::new(),
            }),
        }
    }

    // =========================================================================
    // Continuations
    // =========================================================================

    /// Run `f` with the value if the operation succeeds
    pub fn on_success<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&T) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Ok(value) = outcome {
                f(value);
            }
        })
    }

    /// Run `f` with the error if the operation fails
    pub fn on_failure<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&E) + Send + 'static,
    {
        self.on_complete(move |outcome| {
            if let Err(error) = outcome {
                f(error);
            }
        })
    }

    /// Run `f` with whichever outcome arrives
    pub fn on_complete<F>(&self, f: F) -> &Self
    where
        F: FnOnce(&std::result::Result<T, E>) + Send + 'static,
    {
        let outcome = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Pending(continuations) => {
                    continuations.push(Box::new(f));
                    return self;
                }
                Slot::Done(outcome) => Arc::clone(outcome),
            }
        };

        // Already settled: run on the caller's thread, outside the lock
        run_continuation(Box::new(f), &outcome);
        self
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Settle with a success value
    ///
    /// Fails with [`StrataError::AlreadyCompleted`] if already settled.
    pub fn complete(&self, value: T) -> Result<()> {
        self.settle(Ok(value))
    }

    /// Settle with an error
    ///
    /// Fails with [`StrataError::AlreadyCompleted`] if already settled.
    pub fn fail(&self, error: E) -> Result<()> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: std::result::Result<T, E>) -> Result<()> {
        let outcome = Arc::new(outcome);

        let continuations = {
            let mut slot = self.inner.slot.lock();
            match &mut *slot {
                Slot::Done(_) => {
                    tracing::error!("Attempted to settle an operation that already completed");
                    return Err(StrataError::AlreadyCompleted);
                }
                Slot::Pending(continuations) => {
                    let continuations = std::mem::take(continuations);
                    *slot = Slot::Done(Arc::clone(&outcome));
                    continuations
                }
            }
        };

        self.inner.done.notify_all();

        for continuation in continuations {
            run_continuation(continuation, &outcome);
        }

        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn state(&self) -> OperationState {
        match &*self.inner.slot.lock() {
            Slot::Pending(_) => OperationState::Pending,
            Slot::Done(outcome) if outcome.is_ok() => OperationState::Succeeded,
            Slot::Done(_) => OperationState::Failed,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state() != OperationState::Pending
    }

    /// Whether two handles point at the same operation
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T, E> AsyncOperation<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Block until settled and return the outcome
    pub fn wait(&self) -> std::result::Result<T, E> {
        let mut slot = self.inner.slot.lock();
        loop {
            if let Slot::Done(outcome) = &*slot {
                return (**outcome).clone();
            }
            self.inner.done.wait(&mut slot);
        }
    }

    /// Block up to `timeout`; `None` if still pending afterwards
    pub fn wait_timeout(&self, timeout: Duration) -> Option<std::result::Result<T, E>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();
        loop {
            if let Slot::Done(outcome) = &*slot {
                return Some((**outcome).clone());
            }
            if self.inner.done.wait_until(&mut slot, deadline).timed_out() {
                return match &*slot {
                    Slot::Done(outcome) => Some((**outcome).clone()),
                    Slot::Pending(_) => None,
                };
            }
        }
    }
}

impl<T, E> Default for AsyncOperation<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> fmt::Debug for AsyncOperation<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncOperation")
            .field("state", &self.state())
            .finish()
    }
}

/// A panicking continuation must not stop the ones queued after it
fn run_continuation<T, E>(continuation: Continuation<T, E>, outcome: &std::result::Result<T, E>) {
    if panic::catch_unwind(AssertUnwindSafe(|| continuation(outcome))).is_err() {
        tracing::error!("Operation continuation panicked");
    }
}
