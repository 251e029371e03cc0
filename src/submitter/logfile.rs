//! Log Submitter
//!
//! Appends every applied batch to a local log file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::Batch;
use crate::error::{Result, SubmitError};
use crate::topology::TopologyView;

use super::{LoggedBatch, Submitter};

/// Durable, file-backed submitter
///
/// Each batch is stamped with the root region location from the topology
/// view, so the log shows where the batch would have been routed.
pub struct LogSubmitter {
    path: PathBuf,

    /// Exclusive access while a record is written
    writer: Mutex<BufWriter<File>>,

    topology: Arc<dyn TopologyView>,

    /// fsync after every batch
    sync_every_batch: bool,

    batches_written: AtomicU64,
}

impl LogSubmitter {
    /// Open or create the log at `path` in append mode
    pub fn open(path: impl AsRef<Path>, topology: Arc<dyn TopologyView>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            topology,
            sync_every_batch: false,
            batches_written: AtomicU64::new(0),
        })
    }

    /// fsync the log after each batch
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync_every_batch = sync;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn batches_written(&self) -> u64 {
        self.batches_written.load(Ordering::Relaxed)
    }

    fn write_record(&self, record: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(record)?;
        writer.flush()?;
        if self.sync_every_batch {
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

impl Submitter for LogSubmitter {
    fn apply(&self, batch: &Batch) -> std::result::Result<(), SubmitError> {
        let topology = self.topology.current_topology();
        let root_server = topology.root_region.as_ref().map(|r| r.to_string());

        if topology.degraded {
            tracing::debug!(table = %batch.table(), "Applying batch with frozen topology");
        }

        let record = LoggedBatch::from_batch(batch, root_server)
            .encode()
            .map_err(|e| SubmitError::Other(e.to_string()))?;

        self.write_record(&record).map_err(|e| {
            SubmitError::Other(format!("batch log write to {} failed: {}", self.path.display(), e))
        })?;

        self.batches_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(table = %batch.table(), batch_id = batch.id(), bytes = record.len(), "Batch logged");

        Ok(())
    }
}
