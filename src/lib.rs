//! # Strata
//!
//! A buffered, asynchronous write client for distributed sorted key-value
//! stores:
//! - Non-blocking puts that return a pending operation
//! - Per-table buffering, flushed by size or delay
//! - At most one flush in flight per table, run on a small worker pool
//! - Cluster topology cached from coordination-service notifications
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Client::put(table, mutation)                 │
//! │                  (returns WriteOperation)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                   MutatorRegistry                            │
//! │              (one MutationBuffer per table)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ size / timer / close
//!          ┌────────────▼────────────┐
//!          │      TaskExecutor       │
//!          │ (workers + timer thread)│
//!          └────────────┬────────────┘
//!                       │ Batch
//!          ┌────────────▼────────────┐        ┌──────────────────┐
//!          │        Submitter        │◀───────│  Metadata Watcher │
//!          │   (apply whole batch)   │ route  │ (coordination)    │
//!          └────────────┬────────────┘        └──────────────────┘
//!                       │ outcome
//!                       ▼
//!          every WriteOperation in the batch settles
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod mutation;
pub mod deferred;
pub mod executor;
pub mod buffer;
pub mod submitter;
pub mod topology;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlushError, Result, StrataError, SubmitError};
pub use config::ClientConfig;
pub use client::Client;
pub use deferred::{AsyncOperation, OperationState, WriteAck, WriteOperation};
pub use mutation::{Mutation, MutationKind, TableName};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Strata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
