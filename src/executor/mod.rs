//! Executor Module
//!
//! A small, fixed worker pool plus a timer thread. Flush work, flush timers
//! and flush-timeout watchdogs all run here, never on a submitting thread.
//!
//! ## Layout
//! ```text
//!   execute(task) ───────────────────────────┐
//!                                            ▼
//!   schedule(delay, task) ──▶ [timer] ──▶ task queue ──▶ worker 0..N
//!                          (deadline heap)   (crossbeam)
//!                               │
//!   schedule_inline ────────────┘ runs on the timer thread itself
//! ```
//! Inline tasks are flush-timeout watchdogs: they must fire while every
//! worker is stuck inside a submitter.

mod pool;
mod timer;

pub use pool::TaskExecutor;
pub use timer::TimerHandle;

/// Unit of work run by a worker
pub type Task = Box<dyn FnOnce() + Send + 'static>;
