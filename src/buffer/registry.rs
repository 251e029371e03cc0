//! Mutator registry
//!
//! Table name → buffer map. Read-mostly: a buffer is created once per table
//! and looked up on every put.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{Result, StrataError};
use crate::executor::TaskExecutor;
use crate::mutation::TableName;
use crate::submitter::Submitter;

use super::{BufferSettings, BufferStats, MutationBuffer};

/// Owns one [`MutationBuffer`] per destination table
///
/// ## Concurrency:
/// - `buffers`: RwLock; lookups take the read lock, first access per table
///   re-checks under the write lock so only one buffer is ever created
/// - `closed`: only flipped while the write lock is held
pub struct MutatorRegistry {
    buffers: RwLock<HashMap<TableName, Arc<MutationBuffer>>>,
    settings: BufferSettings,
    submitter: Arc<dyn Submitter>,
    executor: Arc<TaskExecutor>,
    closed: AtomicBool,
}

impl MutatorRegistry {
    pub fn new(
        settings: BufferSettings,
        submitter: Arc<dyn Submitter>,
        executor: Arc<TaskExecutor>,
    ) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            settings,
            submitter,
            executor,
            closed: AtomicBool::new(false),
        }
    }

    /// Get the buffer for `table`, creating it on first use
    pub fn get_buffer(&self, table: &TableName) -> Result<Arc<MutationBuffer>> {
        // Fast path: buffer already exists
        {
            let buffers = self.buffers.read();
            if self.closed.load(Ordering::Acquire) {
                return Err(StrataError::ClientClosed);
            }
            if let Some(buffer) = buffers.get(table) {
                return Ok(Arc::clone(buffer));
            }
        }

        // Slow path: re-check under the write lock before creating
        let mut buffers = self.buffers.write();
        if self.closed.load(Ordering::Acquire) {
            return Err(StrataError::ClientClosed);
        }

        let buffer = buffers.entry(table.clone()).or_insert_with(|| {
            tracing::debug!(%table, "Creating mutation buffer");
            MutationBuffer::new(
                table.clone(),
                self.settings.clone(),
                Arc::clone(&self.submitter),
                Arc::clone(&self.executor),
            )
        });

        Ok(Arc::clone(buffer))
    }

    /// Request a flush on every buffer
    pub fn flush_all(&self) {
        for buffer in self.snapshot() {
            buffer.flush();
        }
    }

    /// Close every buffer, waiting for each to drain
    ///
    /// No buffer can be created afterwards. Idempotent.
    pub fn close_all(&self) {
        let buffers = {
            let buffers = self.buffers.write();
            self.closed.store(true, Ordering::Release);
            buffers.values().cloned().collect::<Vec<_>>()
        };

        tracing::debug!(tables = buffers.len(), "Closing all mutation buffers");

        for buffer in buffers {
            buffer.close();
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tables with a buffer, sorted
    pub fn tables(&self) -> Vec<TableName> {
        let mut tables: Vec<_> = self.buffers.read().keys().cloned().collect();
        tables.sort();
        tables
    }

    pub fn len(&self) -> usize {
        self.buffers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.read().is_empty()
    }

    pub fn stats(&self, table: &TableName) -> Option<BufferStats> {
        self.buffers.read().get(table).map(|buffer| buffer.stats())
    }

    fn snapshot(&self) -> Vec<Arc<MutationBuffer>> {
        self.buffers.read().values().cloned().collect()
    }
}
