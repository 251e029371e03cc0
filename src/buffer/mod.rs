//! Buffer Module
//!
//! Per-table write buffering and the flush policy.
//!
//! ## Responsibilities
//! - Accept mutations without blocking and hand back a [`WriteOperation`]
//! - Flush when the buffer is full or its oldest entry hits the delay limit
//! - Keep at most one flush in flight per table; coalesce extra requests
//! - Fan the batch outcome back out to every operation in the batch
//! - Map tables to buffers, creating each exactly once
//!
//! ## Flush Cycle
//! ```text
//!  enqueue ──▶ pending ──(full / timer / flush() / close())──▶ swap
//!                 ▲                                              │
//!                 │                                   Batch ─────▼
//!                 │                                    Submitter.apply (worker)
//!                 │                                              │
//!                 └──── re-check pending ◀── settle all ops ◀────┘
//! ```
//!
//! [`WriteOperation`]: crate::deferred::WriteOperation

mod batch;
mod mutation_buffer;
mod registry;

pub use batch::Batch;
pub use mutation_buffer::{BufferSettings, BufferStats, MutationBuffer};
pub use registry::MutatorRegistry;
