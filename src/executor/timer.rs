//! Timer thread
//!
//! Holds delayed tasks in a deadline-ordered heap. A due task is either
//! forwarded to the worker queue or, for short watchdog work that must not
//! wait behind busy workers, run on the timer thread itself.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{self, AtomicBool, AtomicUsize};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};

use super::Task;

/// Where a due task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerMode {
    /// Handed to the worker queue
    Worker,
    /// Run directly on the timer thread; must be short and non-blocking
    Inline,
}

/// A task waiting for its deadline
pub(crate) struct TimerEntry {
    pub deadline: Instant,
    /// Tie-breaker so equal deadlines fire in scheduling order
    pub seq: u64,
    pub task: Task,
    pub mode: TimerMode,
    /// Set by a [`TimerHandle`]; cancelled entries never run
    pub cancelled: Option<Arc<AtomicBool>>,
}

impl TimerEntry {
    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .map_or(false, |c| c.load(atomic::Ordering::Acquire))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    // Reversed: BinaryHeap is a max-heap, earliest deadline must be on top
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Cancels one scheduled task
///
/// Dropping the handle does not cancel.
#[derive(Debug)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
    /// Shared with the timer thread; counts cancellations not yet purged
    stale: Arc<AtomicUsize>,
}

impl TimerHandle {
    pub(crate) fn new(cancelled: Arc<AtomicBool>, stale: Arc<AtomicUsize>) -> Self {
        Self { cancelled, stale }
    }

    /// Prevent the task from running. Idempotent; a no-op once it has run.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, atomic::Ordering::AcqRel) {
            self.stale.fetch_add(1, atomic::Ordering::Relaxed);
        }
    }
}

/// Shared counters between the executor and its timer thread
pub(crate) struct TimerShared {
    /// Cancellations since the last purge
    pub stale: Arc<AtomicUsize>,
    /// Entries currently held in the heap
    pub scheduled: Arc<AtomicUsize>,
}

/// Timer loop. Exits when every schedule handle has been dropped.
pub(crate) fn run_timer(requests: Receiver<TimerEntry>, tasks: Sender<Task>, shared: TimerShared) {
    let mut heap: BinaryHeap<TimerEntry> = BinaryHeap::new();

    loop {
        // Step 1: Run or hand off every due task
        let now = Instant::now();
        while heap.peek().map_or(false, |entry| entry.deadline <= now) {
            let Some(entry) = heap.pop() else {
                break;
            };
            if entry.is_cancelled() {
                continue;
            }
            match entry.mode {
                TimerMode::Inline => {
                    if panic::catch_unwind(AssertUnwindSafe(entry.task)).is_err() {
                        tracing::error!("Timer task panicked");
                    }
                }
                TimerMode::Worker => {
                    if tasks.send(entry.task).is_err() {
                        tracing::debug!("Worker queue closed, timer exiting");
                        shared.scheduled.store(0, atomic::Ordering::Relaxed);
                        return;
                    }
                }
            }
        }
        shared.scheduled.store(heap.len(), atomic::Ordering::Relaxed);

        // Step 2: Sleep until the next deadline or a new request
        let next = match heap.peek() {
            Some(entry) => requests.recv_deadline(entry.deadline),
            None => requests.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match next {
            Ok(entry) => {
                heap.push(entry);
                purge_cancelled(&mut heap, &shared.stale);
                shared.scheduled.store(heap.len(), atomic::Ordering::Relaxed);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if !heap.is_empty() {
        tracing::debug!(discarded = heap.len(), "Timer stopped with pending tasks");
    }
    shared.scheduled.store(0, atomic::Ordering::Relaxed);
}

/// Drop cancelled entries once they make up half the heap
///
/// Keeps the heap within a constant factor of the live entries.
fn purge_cancelled(heap: &mut BinaryHeap<TimerEntry>, stale: &AtomicUsize) {
    let cancelled = stale.load(atomic::Ordering::Relaxed);
    if cancelled == 0 || cancelled * 2 < heap.len() {
        return;
    }

    stale.fetch_sub(cancelled, atomic::Ordering::Relaxed);
    heap.retain(|entry| !entry.is_cancelled());
}
