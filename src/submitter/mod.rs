//! Submitter Module
//!
//! The capability that durably applies a batch to the store, plus a local
//! batch log implementation of it.
//!
//! ## Batch Log Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Record 1                                     │
//! │ ┌──────────┬─────────┬─────────┬──────────┐  │
//! │ │ Batch (8)│ CRC (4) │ Len (4) │ Payload  │  │
//! │ └──────────┴─────────┴─────────┴──────────┘  │
//! ├──────────────────────────────────────────────┤
//! │ Record 2 ...                                 │
//! └──────────────────────────────────────────────┘
//! ```
//! Payload is a bincode-encoded [`LoggedBatch`]; the CRC covers the payload.

mod entry;
mod logfile;
mod reader;

pub use entry::{LoggedBatch, HEADER_SIZE};
pub use logfile::LogSubmitter;
pub use reader::BatchLogReader;

use crate::buffer::Batch;
use crate::error::SubmitError;

/// Applies whole batches to the store
///
/// Called from executor workers, concurrently for different tables. A call
/// may take arbitrarily long; retries are the implementation's business.
pub trait Submitter: Send + Sync {
    /// Durably apply every mutation in `batch`, or report why not
    fn apply(&self, batch: &Batch) -> Result<(), SubmitError>;
}

impl<F> Submitter for F
where
    F: Fn(&Batch) -> Result<(), SubmitError> + Send + Sync,
{
    fn apply(&self, batch: &Batch) -> Result<(), SubmitError> {
        self(batch)
    }
}
