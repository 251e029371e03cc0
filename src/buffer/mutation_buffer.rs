//! MutationBuffer implementation
//!
//! Pending sequence behind a mutex, flushes handed to the task executor.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::ClientConfig;
use crate::deferred::{WriteAck, WriteOperation};
use crate::error::{FlushError, Result, StrataError};
use crate::executor::TaskExecutor;
use crate::mutation::{Mutation, TableName};
use crate::submitter::Submitter;

use super::Batch;

/// Flush policy for one buffer
#[derive(Debug, Clone)]
pub struct BufferSettings {
    /// Pending count that forces an immediate flush
    pub max_buffered_count: usize,

    /// Longest a mutation waits before a timer flush
    pub max_buffer_delay: Duration,

    /// Submitter deadline; `None` waits forever
    pub flush_timeout: Option<Duration>,
}

impl From<&ClientConfig> for BufferSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_buffered_count: config.max_buffered_count,
            max_buffer_delay: config.max_buffer_delay(),
            flush_timeout: config.flush_timeout(),
        }
    }
}

/// Point-in-time counters for one buffer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub enqueued: u64,
    pub batches_flushed: u64,
    pub mutations_succeeded: u64,
    pub mutations_failed: u64,
    pub pending: usize,
    pub flush_in_progress: bool,
}

#[derive(Debug, Clone, Copy)]
enum FlushReason {
    Size,
    Timer,
    Explicit,
    Close,
    FollowUp,
}

impl FlushReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Timer => "timer",
            Self::Explicit => "explicit",
            Self::Close => "close",
            Self::FollowUp => "follow-up",
        }
    }
}

/// Mutable buffer state, only touched under `MutationBuffer::state`
struct BufferState {
    /// Awaiting the next flush, in enqueue order
    pending: Vec<(Mutation, WriteOperation)>,

    /// At most one batch per buffer is in the submitter
    flush_in_progress: bool,

    /// A delay timer is outstanding for the current epoch
    timer_armed: bool,

    /// Bumped on every swap; timers from an older epoch are ignored
    epoch: u64,

    /// A flush was asked for while one was in flight
    flush_requested: bool,

    closed: bool,
}

/// Swapped-out pending entries on their way to a worker
struct FlushJob {
    batch: Batch,
    operations: Vec<WriteOperation>,
    reason: FlushReason,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    batches_flushed: AtomicU64,
    mutations_succeeded: AtomicU64,
    mutations_failed: AtomicU64,
}

/// Write buffer for one destination table
///
/// ## Concurrency:
/// - `state`: many submitting threads plus the single in-flight flush
/// - `drained`: signalled whenever the buffer is empty with nothing in flight
/// - Submitter calls run on executor workers, never under `state`
pub struct MutationBuffer {
    table: TableName,
    settings: BufferSettings,
    submitter: Arc<dyn Submitter>,
    executor: Arc<TaskExecutor>,
    state: Mutex<BufferState>,
    drained: Condvar,
    next_batch_id: AtomicU64,
    counters: Arc<Counters>,
    /// Lets timers and flush tasks reach the buffer without `self: Arc<Self>`
    weak_self: Weak<MutationBuffer>,
}

impl MutationBuffer {
    pub fn new(
        table: TableName,
        settings: BufferSettings,
        submitter: Arc<dyn Submitter>,
        executor: Arc<TaskExecutor>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            table,
            settings,
            submitter,
            executor,
            state: Mutex::new(BufferState {
                pending: Vec::new(),
                flush_in_progress: false,
                timer_armed: false,
                epoch: 0,
                flush_requested: false,
                closed: false,
            }),
            drained: Condvar::new(),
            next_batch_id: AtomicU64::new(1),
            counters: Arc::new(Counters::default()),
            weak_self: weak_self.clone(),
        })
    }

    // =========================================================================
    // Public API
    // =========================================================================

    /// Buffer a mutation and return its pending operation
    ///
    /// Never blocks on I/O. Fails only for a malformed mutation or a closed
    /// buffer.
    pub fn enqueue(&self, mutation: Mutation) -> Result<WriteOperation> {
        mutation.validate()?;

        let operation = WriteOperation::new();

        let job = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(StrataError::BufferClosed {
                    table: self.table.to_string(),
                });
            }

            state.pending.push((mutation, operation.clone()));
            self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

            if state.pending.len() >= self.settings.max_buffered_count {
                self.start_flush_locked(&mut state, FlushReason::Size)
            } else if !state.timer_armed {
                self.arm_timer_locked(&mut state)
            } else {
                None
            }
        };

        if let Some(job) = job {
            self.dispatch(job);
        }

        Ok(operation)
    }

    /// Ask for a flush now
    ///
    /// Coalesces with a flush already in flight: that flush is followed
    /// immediately by another one carrying whatever is pending.
    pub fn flush(&self) {
        let job = {
            let mut state = self.state.lock();
            self.start_flush_locked(&mut state, FlushReason::Explicit)
        };

        if let Some(job) = job {
            self.dispatch(job);
        }
    }

    /// Flush everything and wait until every operation has settled
    ///
    /// Later enqueues fail with [`StrataError::BufferClosed`]. Must not be
    /// called from a continuation or executor task: it blocks until a worker
    /// finishes the final flush.
    pub fn close(&self) {
        let job = {
            let mut state = self.state.lock();
            if !state.closed {
                state.closed = true;
                tracing::debug!(table = %self.table, pending = state.pending.len(), "Closing buffer");
            }
            state.timer_armed = false;
            state.epoch += 1;
            self.start_flush_locked(&mut state, FlushReason::Close)
        };

        if let Some(job) = job {
            self.dispatch(job);
        }

        let mut state = self.state.lock();
        while state.flush_in_progress || !state.pending.is_empty() {
            self.drained.wait(&mut state);
        }
    }

    // =========================================================================
    // Flush Scheduling (called with `state` held)
    // =========================================================================

    /// Swap out the pending sequence, or note the request if a flush is in flight
    fn start_flush_locked(&self, state: &mut BufferState, reason: FlushReason) -> Option<FlushJob> {
        if state.flush_in_progress {
            state.flush_requested = true;
            return None;
        }
        if state.pending.is_empty() {
            return None;
        }

        let entries = std::mem::take(&mut state.pending);
        state.flush_in_progress = true;
        state.flush_requested = false;
        state.timer_armed = false;
        state.epoch += 1;

        let (mutations, operations): (Vec<_>, Vec<_>) = entries.into_iter().unzip();
        let id = self.next_batch_id.fetch_add(1, Ordering::Relaxed);

        Some(FlushJob {
            batch: Batch::new(self.table.clone(), id, mutations),
            operations,
            reason,
        })
    }

    /// Arm the delay timer for the current epoch
    ///
    /// Without a timer thread the pending entries would never flush, so they
    /// are flushed right away instead.
    fn arm_timer_locked(&self, state: &mut BufferState) -> Option<FlushJob> {
        let epoch = state.epoch;
        let weak = self.weak_self.clone();

        let armed = self.executor.schedule(self.settings.max_buffer_delay, move || {
            if let Some(buffer) = weak.upgrade() {
                buffer.on_timer(epoch);
            }
        });

        match armed {
            Ok(()) => {
                state.timer_armed = true;
                None
            }
            Err(e) => {
                tracing::warn!(table = %self.table, error = %e, "Could not arm flush timer");
                self.start_flush_locked(state, FlushReason::FollowUp)
            }
        }
    }

    fn on_timer(&self, epoch: u64) {
        let job = {
            let mut state = self.state.lock();
            if state.epoch != epoch || !state.timer_armed {
                return;
            }
            state.timer_armed = false;
            self.start_flush_locked(&mut state, FlushReason::Timer)
        };

        if let Some(job) = job {
            self.dispatch(job);
        }
    }

    // =========================================================================
    // Flush Execution
    // =========================================================================

    /// Hand a job to a worker; settle it inline as failed if none is available
    fn dispatch(&self, job: FlushJob) {
        let Some(buffer) = self.weak_self.upgrade() else {
            return;
        };

        let slot = Arc::new(Mutex::new(Some(job)));
        let task_slot = Arc::clone(&slot);

        let sent = self.executor.execute(move || {
            if let Some(job) = task_slot.lock().take() {
                buffer.run_flush(job);
            }
        });

        if sent.is_err() {
            if let Some(job) = slot.lock().take() {
                tracing::warn!(
                    table = %self.table,
                    batch_id = job.batch.id(),
                    "No executor for flush, failing batch"
                );
                let settlement = Settlement::new(
                    &self.table,
                    job.batch.id(),
                    job.operations,
                    Arc::clone(&self.counters),
                );
                settlement.settle(Err(FlushError::ExecutorUnavailable));
                self.finish_flush();
            }
        }
    }

    /// Runs on a worker: submit, settle, then look for follow-up work
    fn run_flush(&self, job: FlushJob) {
        let batch_id = job.batch.id();
        let batch_size = job.batch.len();

        tracing::debug!(
            table = %self.table,
            batch_id,
            batch_size,
            reason = job.reason.as_str(),
            "Flushing batch"
        );

        let FlushJob { batch, operations, .. } = job;
        let settlement = Arc::new(Settlement::new(
            &self.table,
            batch_id,
            operations,
            Arc::clone(&self.counters),
        ));

        // Watchdog on the timer thread: every worker may be stuck in a submitter
        let watchdog = self.settings.flush_timeout.and_then(|timeout| {
            let settlement = Arc::clone(&settlement);
            let timeout_ms = timeout.as_millis() as u64;
            let table = self.table.clone();
            let armed = self.executor.schedule_inline(timeout, move || {
                if settlement.settle(Err(FlushError::TimedOut { timeout_ms })) {
                    tracing::warn!(%table, batch_id, timeout_ms, "Flush timed out");
                }
            });
            match armed {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::debug!(table = %self.table, error = %e, "Flush watchdog not armed");
                    None
                }
            }
        });

        let started = Instant::now();
        let applied = panic::catch_unwind(AssertUnwindSafe(|| self.submitter.apply(&batch)));

        let outcome = match applied {
            Ok(Ok(())) => Ok(WriteAck {
                table: self.table.clone(),
                batch_id,
                batch_size,
            }),
            Ok(Err(e)) => Err(FlushError::Submit(e)),
            Err(payload) => Err(FlushError::SubmitterPanicked(panic_message(payload))),
        };

        if let Some(handle) = watchdog {
            handle.cancel();
        }

        self.counters.batches_flushed.fetch_add(1, Ordering::Relaxed);

        match &outcome {
            Ok(_) => tracing::debug!(
                table = %self.table,
                batch_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch applied"
            ),
            Err(e) => tracing::warn!(
                table = %self.table,
                batch_id,
                batch_size,
                error = %e,
                "Batch failed"
            ),
        }

        if !settlement.settle(outcome) {
            tracing::debug!(table = %self.table, batch_id, "Submitter returned after batch was settled");
        }

        self.finish_flush();
    }

    /// Clear the in-flight flag and start whatever is due next
    fn finish_flush(&self) {
        let job = {
            let mut state = self.state.lock();
            state.flush_in_progress = false;

            let job = if state.pending.is_empty() {
                None
            } else if state.flush_requested
                || state.closed
                || state.pending.len() >= self.settings.max_buffered_count
            {
                self.start_flush_locked(&mut state, FlushReason::FollowUp)
            } else if !state.timer_armed {
                self.arm_timer_locked(&mut state)
            } else {
                None
            };

            if !state.flush_in_progress && state.pending.is_empty() {
                self.drained.notify_all();
            }

            job
        };

        if let Some(job) = job {
            self.dispatch(job);
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> &TableName {
        &self.table
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn stats(&self) -> BufferStats {
        let (pending, flush_in_progress) = {
            let state = self.state.lock();
            (state.pending.len(), state.flush_in_progress)
        };

        BufferStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            batches_flushed: self.counters.batches_flushed.load(Ordering::Relaxed),
            mutations_succeeded: self.counters.mutations_succeeded.load(Ordering::Relaxed),
            mutations_failed: self.counters.mutations_failed.load(Ordering::Relaxed),
            pending,
            flush_in_progress,
        }
    }
}

/// Distributes one outcome to a batch's operations, exactly once
///
/// Shared by the flush task and its timeout watchdog; the first caller wins.
struct Settlement {
    table: TableName,
    batch_id: u64,
    operations: Mutex<Option<Vec<WriteOperation>>>,
    counters: Arc<Counters>,
}

impl Settlement {
    fn new(
        table: &TableName,
        batch_id: u64,
        operations: Vec<WriteOperation>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            table: table.clone(),
            batch_id,
            operations: Mutex::new(Some(operations)),
            counters,
        }
    }

    /// Returns false if the batch was already settled
    fn settle(&self, outcome: std::result::Result<WriteAck, FlushError>) -> bool {
        let Some(operations) = self.operations.lock().take() else {
            return false;
        };

        // Counted first so stats are current once any continuation runs
        let counter = if outcome.is_ok() {
            &self.counters.mutations_succeeded
        } else {
            &self.counters.mutations_failed
        };
        counter.fetch_add(operations.len() as u64, Ordering::Relaxed);

        for operation in operations {
            let settled = match &outcome {
                Ok(ack) => operation.complete(ack.clone()),
                Err(e) => operation.fail(e.clone()),
            };
            if let Err(e) = settled {
                tracing::error!(table = %self.table, batch_id = self.batch_id, error = %e, "Operation settled twice");
            }
        }

        true
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
