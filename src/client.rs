//! Client Module
//!
//! The caller-facing write client that ties all components together.
//!
//! ## Responsibilities
//! - Route each put to its table's buffer
//! - Own the task executor that runs flushes
//! - Own the cluster metadata watcher, if any
//! - Drain every buffer on shutdown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::buffer::{BufferSettings, BufferStats, MutatorRegistry};
use crate::config::ClientConfig;
use crate::deferred::WriteOperation;
use crate::error::{Result, StrataError};
use crate::executor::TaskExecutor;
use crate::mutation::{Mutation, TableName};
use crate::submitter::Submitter;
use crate::topology::{ClusterMetadata, ClusterMetadataWatcher, TopologyView};

/// Buffered, asynchronous write client
///
/// ## Concurrency Model
///
/// - `put` never blocks on I/O: it appends to a per-table buffer under a
///   short lock and returns a pending [`WriteOperation`]
/// - Flushes run on a fixed worker pool, at most one per table at a time
/// - `close` is the only call that waits, and only for in-flight work
pub struct Client {
    config: ClientConfig,

    /// Runs flush, timer and watchdog tasks
    executor: Arc<TaskExecutor>,

    /// Table → buffer map
    registry: MutatorRegistry,

    /// Cluster topology source, if one was supplied
    watcher: Option<Arc<ClusterMetadataWatcher>>,

    closed: AtomicBool,
}

impl Client {
    /// Create a client that hands batches to `submitter`
    pub fn new(config: ClientConfig, submitter: Arc<dyn Submitter>) -> Result<Self> {
        config.validate()?;

        let executor = Arc::new(TaskExecutor::new(config.worker_pool_size)?);
        let registry = MutatorRegistry::new(
            BufferSettings::from(&config),
            submitter,
            Arc::clone(&executor),
        );

        tracing::info!(
            max_buffered_count = config.max_buffered_count,
            max_buffer_delay_ms = config.max_buffer_delay_ms,
            workers = config.worker_pool_size,
            "Strata client started"
        );

        Ok(Self {
            config,
            executor,
            registry,
            watcher: None,
            closed: AtomicBool::new(false),
        })
    }

    /// Create a client that also owns a cluster metadata watcher
    ///
    /// The watcher is stopped when the client closes.
    pub fn with_watcher(
        config: ClientConfig,
        submitter: Arc<dyn Submitter>,
        watcher: Arc<ClusterMetadataWatcher>,
    ) -> Result<Self> {
        let mut client = Self::new(config, submitter)?;
        client.watcher = Some(watcher);
        Ok(client)
    }

    /// Submit a mutation for `table`
    ///
    /// Returns as soon as the mutation is buffered. The operation settles
    /// once the batch carrying it has been applied or has failed.
    pub fn put(&self, table: impl Into<TableName>, mutation: Mutation) -> Result<WriteOperation> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::ClientClosed);
        }

        let table = table.into();
        self.registry.get_buffer(&table)?.enqueue(mutation)
    }

    /// Ask every table's buffer to flush now
    pub fn flush(&self) {
        self.registry.flush_all();
    }

    /// Drain all buffers and release every resource
    ///
    /// Returns once every previously returned operation has settled, also
    /// when another thread's close is still draining. Safe to repeat: every
    /// step below is idempotent and waits on the same drain.
    pub fn close(&self) {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if first {
            tracing::info!(tables = self.registry.len(), "Closing Strata client");
        }

        // Step 1: Final flush of every table, waiting for drain
        self.registry.close_all();

        // Step 2: Stop topology updates
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }

        // Step 3: Stop the workers (nothing left to run)
        self.executor.shutdown();

        if first {
            tracing::info!("Strata client closed");
        }
    }

    // =========================================================================
    // Accessors (for monitoring and testing)
    // =========================================================================

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Last known cluster topology, if a watcher is attached
    pub fn topology(&self) -> Option<Arc<ClusterMetadata>> {
        self.watcher.as_ref().map(|w| w.current_topology())
    }

    pub fn buffer_stats(&self, table: impl Into<TableName>) -> Option<BufferStats> {
        self.registry.stats(&table.into())
    }

    /// Tables written to so far
    pub fn tables(&self) -> Vec<TableName> {
        self.registry.tables()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close();
    }
}
