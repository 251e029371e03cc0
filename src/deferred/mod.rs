//! Deferred Module
//!
//! Single-assignment completion cells for writes that finish later.
//!
//! ## State Machine
//! ```text
//!            complete(v)
//!   Pending ────────────▶ Succeeded
//!      │
//!      │     fail(e)
//!      └────────────────▶ Failed
//! ```
//! Both terminal states are final. Continuations registered before
//! completion are queued; those registered after run immediately on the
//! registering thread. Every continuation runs exactly once.

mod operation;

pub use operation::{AsyncOperation, OperationState};

use crate::error::FlushError;
use crate::mutation::TableName;

/// Success value delivered for a flushed mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    /// Table the mutation was written to
    pub table: TableName,

    /// Per-table sequence number of the batch that carried it
    pub batch_id: u64,

    /// Number of mutations in that batch
    pub batch_size: usize,
}

/// Handle returned for every enqueued mutation
pub type WriteOperation = AsyncOperation<WriteAck, FlushError>;
