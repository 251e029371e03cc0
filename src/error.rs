//! Error types for Strata
//!
//! Two families of errors live here:
//! - [`StrataError`]: returned synchronously from client calls
//! - [`SubmitError`] / [`FlushError`]: outcomes of a flushed batch, delivered
//!   asynchronously through every operation of that batch (hence `Clone`)

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for Strata client operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // Submission Errors
    // -------------------------------------------------------------------------
    #[error("Buffer closed for table '{table}'")]
    BufferClosed { table: String },

    #[error("Client closed")]
    ClientClosed,

    #[error("Invalid mutation: {0}")]
    InvalidMutation(String),

    #[error("Task executor is shut down")]
    ExecutorShutdown,

    // -------------------------------------------------------------------------
    // Completion Errors
    // -------------------------------------------------------------------------
    #[error("Operation already completed")]
    AlreadyCompleted,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Batch Log Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Batch log corruption detected: {0}")]
    LogCorruption(String),

    // -------------------------------------------------------------------------
    // Coordination Errors
    // -------------------------------------------------------------------------
    #[error("Coordination error: {0}")]
    Coordination(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for StrataError {
    fn from(e: bincode::Error) -> Self {
        StrataError::Serialization(e.to_string())
    }
}

/// Failure reported by a [`Submitter`](crate::submitter::Submitter) for a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("connectivity lost: {0}")]
    Connectivity(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("rejected by store (backpressure): {0}")]
    Backpressure(String),

    /// The store accepted part of the batch. Row indexes refer to the batch order.
    #[error("{} rows failed: {reason}", failed_rows.len())]
    PartialFailure { failed_rows: Vec<usize>, reason: String },

    #[error("{0}")]
    Other(String),
}

/// Outcome delivered to the failure continuations of every operation in a batch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushError {
    #[error("submit failed: {0}")]
    Submit(#[from] SubmitError),

    #[error("flush timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },

    #[error("submitter panicked: {0}")]
    SubmitterPanicked(String),

    #[error("no executor available to run the flush")]
    ExecutorUnavailable,
}
