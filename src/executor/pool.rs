//! Worker pool
//!
//! Fixed number of named threads pulling boxed tasks off a shared channel.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, StrataError};

use super::timer::{run_timer, TimerEntry, TimerHandle, TimerMode, TimerShared};
use super::Task;

/// Runs flush work without blocking callers
///
/// ## Concurrency:
/// - `tasks` / `timer`: senders behind RwLock; taken (set to None) on shutdown
/// - `handles`: joined exactly once by whoever calls `shutdown` first
/// - All methods use `&self`
pub struct TaskExecutor {
    /// Queue feeding the workers
    tasks: RwLock<Option<Sender<Task>>>,

    /// Queue feeding the timer thread
    timer: RwLock<Option<Sender<TimerEntry>>>,

    /// Worker threads followed by the timer thread
    handles: Mutex<Vec<JoinHandle<()>>>,

    /// Scheduling sequence for timer tie-breaks
    next_seq: AtomicU64,

    /// Cancelled timer entries not yet purged
    stale_timers: Arc<AtomicUsize>,

    /// Entries held by the timer thread
    scheduled: Arc<AtomicUsize>,

    worker_count: usize,
}

impl TaskExecutor {
    /// Start `worker_count` workers and one timer thread
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(StrataError::Config(
                "worker pool needs at least one worker".to_string(),
            ));
        }

        let (task_tx, task_rx) = channel::unbounded::<Task>();
        let (timer_tx, timer_rx) = channel::unbounded::<TimerEntry>();

        let mut handles = Vec::with_capacity(worker_count + 1);
        for id in 0..worker_count {
            let rx = task_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("strata-worker-{}", id))
                .spawn(move || run_worker(id, rx))?;
            handles.push(handle);
        }

        let stale_timers = Arc::new(AtomicUsize::new(0));
        let scheduled = Arc::new(AtomicUsize::new(0));
        let shared = TimerShared {
            stale: Arc::clone(&stale_timers),
            scheduled: Arc::clone(&scheduled),
        };

        let timer_tasks = task_tx.clone();
        let handle = thread::Builder::new()
            .name("strata-timer".to_string())
            .spawn(move || run_timer(timer_rx, timer_tasks, shared))?;
        handles.push(handle);

        tracing::debug!(workers = worker_count, "Task executor started");

        Ok(Self {
            tasks: RwLock::new(Some(task_tx)),
            timer: RwLock::new(Some(timer_tx)),
            handles: Mutex::new(handles),
            next_seq: AtomicU64::new(0),
            stale_timers,
            scheduled,
            worker_count,
        })
    }

    /// Run `task` on the next free worker
    pub fn execute<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let tasks = self.tasks.read();
        let sender = tasks.as_ref().ok_or(StrataError::ExecutorShutdown)?;
        sender
            .send(Box::new(task))
            .map_err(|_| StrataError::ExecutorShutdown)
    }

    /// Run `task` on a worker once `delay` has elapsed
    pub fn schedule<F>(&self, delay: Duration, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.submit_timer(delay, Box::new(task), TimerMode::Worker, None)
    }

    /// Run `task` on the timer thread once `delay` has elapsed
    ///
    /// Fires even when every worker is busy, so `task` must be short and
    /// must not block. The returned handle cancels it.
    pub fn schedule_inline<F>(&self, delay: Duration, task: F) -> Result<TimerHandle>
    where
        F: FnOnce() + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        self.submit_timer(
            delay,
            Box::new(task),
            TimerMode::Inline,
            Some(Arc::clone(&cancelled)),
        )?;
        Ok(TimerHandle::new(cancelled, Arc::clone(&self.stale_timers)))
    }

    fn submit_timer(
        &self,
        delay: Duration,
        task: Task,
        mode: TimerMode,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Result<()> {
        let timer = self.timer.read();
        let sender = timer.as_ref().ok_or(StrataError::ExecutorShutdown)?;
        let entry = TimerEntry {
            deadline: Instant::now() + delay,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            task,
            mode,
            cancelled,
        };
        sender
            .send(entry)
            .map_err(|_| StrataError::ExecutorShutdown)
    }

    /// Stop accepting work, let queued tasks finish, join all threads
    ///
    /// Delayed tasks that are not yet due are discarded. Idempotent.
    pub fn shutdown(&self) {
        // Step 1: Stop the timer first so it releases its task sender
        self.timer.write().take();

        // Step 2: Close the worker queue; workers drain what is queued
        self.tasks.write().take();

        // Step 3: Join everything (a worker may be the one shutting us down)
        let handles = std::mem::take(&mut *self.handles.lock());
        if handles.is_empty() {
            return;
        }

        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("Executor thread panicked during shutdown");
            }
        }

        tracing::debug!("Task executor stopped");
    }

    /// Whether new work is still accepted
    pub fn is_running(&self) -> bool {
        self.tasks.read().is_some()
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Tasks queued but not yet picked up by a worker
    pub fn queued(&self) -> usize {
        self.tasks.read().as_ref().map_or(0, |tx| tx.len())
    }

    /// Delayed tasks held by the timer, cancelled ones not yet purged included
    pub fn scheduled(&self) -> usize {
        self.scheduled.load(Ordering::Relaxed)
    }
}

impl Drop for TaskExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(id: usize, tasks: Receiver<Task>) {
    for task in tasks.iter() {
        if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
            tracing::error!(worker = id, "Task panicked");
        }
    }
    tracing::trace!(worker = id, "Worker exiting");
}
