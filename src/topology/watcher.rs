//! Cluster metadata watcher
//!
//! Keeps the root region location current from coordination notifications.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};

use crate::config::ClientConfig;
use crate::error::Result;

use super::{
    ClusterMetadata, CoordinationService, RegionLocation, TopologyView, WatchEvent, WatchHandler,
};

/// Maintains the cached [`ClusterMetadata`]
///
/// ## Concurrency:
/// - `cache`: single slot; readers clone the `Arc` under a short read lock
/// - Notifications arrive on coordination-service threads
/// - At most one reconnect thread runs at a time (`reconnecting`)
pub struct ClusterMetadataWatcher {
    coordination: Arc<dyn CoordinationService>,

    /// Node holding the root region location
    root_path: String,

    reconnect_backoff: Duration,

    /// 0 = unlimited
    max_reconnect_attempts: u32,

    cache: RwLock<Arc<ClusterMetadata>>,

    reconnecting: AtomicBool,
    stopped: AtomicBool,

    /// Dropped on stop; wakes the reconnect thread out of its backoff
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,

    reconnect_handle: Mutex<Option<JoinHandle<()>>>,

    /// Handler registered with the coordination service (holds a weak ref)
    relay: Arc<dyn WatchHandler>,

    weak_self: Weak<ClusterMetadataWatcher>,
}

impl ClusterMetadataWatcher {
    /// Connect, read the root region, and start watching it
    ///
    /// A failed first connection does not fail startup: the watcher starts
    /// degraded with an empty view and keeps reconnecting in the background.
    pub fn start(coordination: Arc<dyn CoordinationService>, config: &ClientConfig) -> Arc<Self> {
        let (stop_tx, stop_rx) = channel::bounded(0);

        let watcher = Arc::new_cyclic(|weak_self: &Weak<Self>| Self {
            coordination,
            root_path: config.root_region_path(),
            reconnect_backoff: config.reconnect_backoff(),
            max_reconnect_attempts: config.max_reconnect_attempts,
            cache: RwLock::new(Arc::new(ClusterMetadata::default())),
            reconnecting: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            stop_tx: Mutex::new(Some(stop_tx)),
            stop_rx,
            reconnect_handle: Mutex::new(None),
            relay: Arc::new(WatchRelay {
                watcher: weak_self.clone(),
            }),
            weak_self: weak_self.clone(),
        });

        tracing::info!(
            quorum = %config.quorum_spec,
            path = %watcher.root_path,
            "Starting cluster metadata watcher"
        );

        if let Err(e) = watcher.establish() {
            tracing::warn!(error = %e, "Initial coordination connect failed");
            watcher.on_session_lost();
        }

        watcher
    }

    /// React to a coordination notification
    pub fn handle_event(&self, event: WatchEvent) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }

        tracing::trace!(?event, "Coordination event");

        match event {
            WatchEvent::Connected => {
                if self.is_degraded() {
                    if let Err(e) = self.refresh() {
                        tracing::warn!(error = %e, "Re-registering watch after connect failed");
                        self.on_session_lost();
                    }
                }
            }
            WatchEvent::Disconnected | WatchEvent::Expired => self.on_session_lost(),
            WatchEvent::NodeDataChanged { path } | WatchEvent::NodeDeleted { path }
                if path == self.root_path =>
            {
                if let Err(e) = self.refresh() {
                    tracing::warn!(error = %e, "Re-reading root region failed");
                    self.on_session_lost();
                }
            }
            WatchEvent::NodeDataChanged { path } | WatchEvent::NodeDeleted { path } => {
                tracing::trace!(%path, "Ignoring event for unwatched node");
            }
        }
    }

    /// Stop reconnecting and release the coordination session
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        self.stop_tx.lock().take();
        if let Some(handle) = self.reconnect_handle.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("Reconnect thread panicked");
            }
        }

        self.coordination.close();
        tracing::debug!("Cluster metadata watcher stopped");
    }

    // =========================================================================
    // Session Handling
    // =========================================================================

    fn establish(&self) -> Result<()> {
        self.coordination.connect()?;
        self.refresh()
    }

    /// Read the root node, re-arm its watch, install the result
    fn refresh(&self) -> Result<()> {
        let data = self
            .coordination
            .watch(&self.root_path, Arc::clone(&self.relay))?;

        let root_region = match data {
            None => None,
            Some(bytes) => match RegionLocation::from_node_data(&bytes) {
                Ok(location) => Some(location),
                Err(e) => {
                    tracing::warn!(path = %self.root_path, error = %e, "Ignoring malformed root region data");
                    self.current_topology().root_region.clone()
                }
            },
        };

        self.install(root_region);
        Ok(())
    }

    fn install(&self, root_region: Option<RegionLocation>) {
        let mut cache = self.cache.write();
        if cache.version > 0 && !cache.degraded && cache.root_region == root_region {
            return;
        }

        let next = ClusterMetadata {
            root_region,
            version: cache.version + 1,
            degraded: false,
        };

        match &next.root_region {
            Some(location) => {
                tracing::info!(root = %location, version = next.version, "Cluster topology updated")
            }
            None => tracing::warn!(version = next.version, "Root region location unknown"),
        }

        *cache = Arc::new(next);
    }

    fn on_session_lost(&self) {
        {
            let mut cache = self.cache.write();
            if !cache.degraded {
                let mut frozen = (**cache).clone();
                frozen.degraded = true;
                *cache = Arc::new(frozen);
                tracing::warn!("Coordination session lost, routing with frozen topology");
            }
        }
        self.spawn_reconnect();
    }

    fn spawn_reconnect(&self) {
        if self.stopped.load(Ordering::Acquire) || self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }

        let weak = self.weak_self.clone();
        let stop_rx = self.stop_rx.clone();
        let backoff = self.reconnect_backoff;
        let max_attempts = self.max_reconnect_attempts;

        let spawned = thread::Builder::new()
            .name("strata-reconnect".to_string())
            .spawn(move || reconnect_loop(weak, stop_rx, backoff, max_attempts));

        match spawned {
            Ok(handle) => *self.reconnect_handle.lock() = Some(handle),
            Err(e) => {
                tracing::error!(error = %e, "Could not start reconnect thread");
                self.reconnecting.store(false, Ordering::Release);
            }
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    pub fn is_degraded(&self) -> bool {
        self.cache.read().degraded
    }

    pub fn is_reconnecting(&self) -> bool {
        self.reconnecting.load(Ordering::Acquire)
    }
}

impl TopologyView for ClusterMetadataWatcher {
    fn current_topology(&self) -> Arc<ClusterMetadata> {
        Arc::clone(&self.cache.read())
    }
}

/// Retry `establish` with a fixed backoff until healthy, stopped, or out of attempts
fn reconnect_loop(
    weak: Weak<ClusterMetadataWatcher>,
    stop_rx: Receiver<()>,
    backoff: Duration,
    max_attempts: u32,
) {
    let mut attempt = 0u32;

    loop {
        match stop_rx.recv_timeout(backoff) {
            Err(RecvTimeoutError::Timeout) => {}
            _ => return,
        }

        let Some(watcher) = weak.upgrade() else {
            return;
        };
        if !watcher.is_degraded() {
            break;
        }

        attempt += 1;
        match watcher.establish() {
            Ok(()) => {
                tracing::info!(attempt, "Coordination session re-established");
                break;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Coordination reconnect failed");
                if max_attempts > 0 && attempt >= max_attempts {
                    tracing::error!(attempts = attempt, "Giving up on coordination reconnect");
                    watcher.reconnecting.store(false, Ordering::Release);
                    return;
                }
            }
        }
    }

    if let Some(watcher) = weak.upgrade() {
        watcher.reconnecting.store(false, Ordering::Release);
        // Session may have dropped again between the last check and now
        if watcher.is_degraded() {
            watcher.spawn_reconnect();
        }
    }
}

struct WatchRelay {
    watcher: Weak<ClusterMetadataWatcher>,
}

impl WatchHandler for WatchRelay {
    fn process(&self, event: WatchEvent) {
        if let Some(watcher) = self.watcher.upgrade() {
            watcher.handle_event(event);
        }
    }
}
