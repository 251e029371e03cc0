//! Topology Module
//!
//! The client's cached view of cluster layout, kept current by watching the
//! coordination service.
//!
//! ## Responsibilities
//! - Cache the root region location in a single slot readers never block on
//! - Re-read and re-arm the watch on every change notification
//! - Freeze the cache and reconnect in the background when the session drops
//!
//! Routing itself belongs to the submitter; it only reads [`TopologyView`].

mod memory;
mod metadata;
mod watcher;

use std::sync::Arc;

pub use memory::MemoryCoordination;
pub use metadata::{ClusterMetadata, RegionLocation};
pub use watcher::ClusterMetadataWatcher;

use crate::error::Result;

/// Notification delivered by the coordination service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Session (re-)established
    Connected,

    /// Session lost; may come back
    Disconnected,

    /// Session expired; every watch is gone
    Expired,

    /// Data of a watched node changed. Watches are one-shot: re-read to re-arm.
    NodeDataChanged { path: String },

    /// A watched node was removed
    NodeDeleted { path: String },
}

/// Receives coordination notifications
pub trait WatchHandler: Send + Sync {
    fn process(&self, event: WatchEvent);
}

/// Client side of the coordination service
pub trait CoordinationService: Send + Sync {
    /// Establish or re-establish the session
    fn connect(&self) -> Result<()>;

    /// Read `path` and leave a one-shot watch on it
    ///
    /// Returns `None` if the node does not exist; the watch still fires when
    /// it is created.
    fn watch(&self, path: &str, handler: Arc<dyn WatchHandler>) -> Result<Option<Vec<u8>>>;

    /// Release the session
    fn close(&self) {}
}

/// Read-only access to the current cluster metadata
pub trait TopologyView: Send + Sync {
    /// Last known view; never blocks, may be stale
    fn current_topology(&self) -> Arc<ClusterMetadata>;
}

/// Fixed topology, for setups without a coordination service
pub struct StaticTopology(Arc<ClusterMetadata>);

impl StaticTopology {
    pub fn new(metadata: ClusterMetadata) -> Self {
        Self(Arc::new(metadata))
    }
}

impl TopologyView for StaticTopology {
    fn current_topology(&self) -> Arc<ClusterMetadata> {
        Arc::clone(&self.0)
    }
}
