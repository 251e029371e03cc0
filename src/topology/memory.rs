//! In-process coordination service
//!
//! Node store with one-shot watches and controllable session state. Events
//! are delivered synchronously on the thread that caused them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StrataError};

use super::{CoordinationService, WatchEvent, WatchHandler};

#[derive(Default)]
struct MemoryState {
    nodes: HashMap<String, Vec<u8>>,

    /// One-shot watches per path, cleared when they fire
    watches: HashMap<String, Vec<Arc<dyn WatchHandler>>>,

    /// Every handler seen; receives session events
    sessions: Vec<Arc<dyn WatchHandler>>,

    connected: bool,

    /// When false, `connect` fails
    reachable: bool,
}

/// Coordination service held entirely in memory
pub struct MemoryCoordination {
    state: Mutex<MemoryState>,
    connect_attempts: AtomicU32,
}

impl MemoryCoordination {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                reachable: true,
                ..MemoryState::default()
            }),
            connect_attempts: AtomicU32::new(0),
        }
    }

    /// Create or overwrite a node, firing its data watches
    pub fn set_data(&self, path: &str, data: impl Into<Vec<u8>>) {
        let fired = {
            let mut state = self.state.lock();
            state.nodes.insert(path.to_string(), data.into());
            take_watches(&mut state, path)
        };
        deliver(
            fired,
            WatchEvent::NodeDataChanged {
                path: path.to_string(),
            },
        );
    }

    /// Remove a node, firing its watches
    pub fn delete(&self, path: &str) {
        let fired = {
            let mut state = self.state.lock();
            state.nodes.remove(path);
            take_watches(&mut state, path)
        };
        deliver(
            fired,
            WatchEvent::NodeDeleted {
                path: path.to_string(),
            },
        );
    }

    /// Drop the session; all watches are lost
    pub fn disconnect(&self) {
        self.drop_session(WatchEvent::Disconnected);
    }

    /// Expire the session; all watches are lost
    pub fn expire(&self) {
        self.drop_session(WatchEvent::Expired);
    }

    /// Control whether `connect` succeeds
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Total `connect` calls so far
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    fn drop_session(&self, event: WatchEvent) {
        let sessions = {
            let mut state = self.state.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.watches.clear();
            state.sessions.clone()
        };
        deliver(sessions, event);
    }
}

impl Default for MemoryCoordination {
    fn default() -> Self {
        Self::new()
    }
}

impl CoordinationService for MemoryCoordination {
    fn connect(&self) -> Result<()> {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);

        let sessions = {
            let mut state = self.state.lock();
            if !state.reachable {
                return Err(StrataError::Coordination("connection refused".to_string()));
            }
            if state.connected {
                return Ok(());
            }
            state.connected = true;
            state.sessions.clone()
        };

        deliver(sessions, WatchEvent::Connected);
        Ok(())
    }

    fn watch(&self, path: &str, handler: Arc<dyn WatchHandler>) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(StrataError::Coordination("not connected".to_string()));
        }

        if !state.sessions.iter().any(|h| same_handler(h, &handler)) {
            state.sessions.push(Arc::clone(&handler));
        }

        let watches = state.watches.entry(path.to_string()).or_default();
        if !watches.iter().any(|h| same_handler(h, &handler)) {
            watches.push(handler);
        }

        Ok(state.nodes.get(path).cloned())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.connected = false;
        state.watches.clear();
        state.sessions.clear();
    }
}

fn take_watches(state: &mut MemoryState, path: &str) -> Vec<Arc<dyn WatchHandler>> {
    if !state.connected {
        return Vec::new();
    }
    state.watches.remove(path).unwrap_or_default()
}

fn deliver(handlers: Vec<Arc<dyn WatchHandler>>, event: WatchEvent) {
    for handler in handlers {
        handler.process(event.clone());
    }
}

/// Compare by data pointer only; vtable pointers are not unique
fn same_handler(a: &Arc<dyn WatchHandler>, b: &Arc<dyn WatchHandler>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
