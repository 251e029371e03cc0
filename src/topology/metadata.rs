//! Cluster metadata
//!
//! Immutable snapshots; the watcher swaps in a new one on every change.

use std::fmt;
use std::str::FromStr;

use crate::error::StrataError;

/// Address of the server hosting a region
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionLocation {
    pub host: String,
    pub port: u16,
}

impl RegionLocation {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse node data of the form `host:port`
    pub fn from_node_data(data: &[u8]) -> Result<Self, StrataError> {
        let text = std::str::from_utf8(data).map_err(|e| {
            StrataError::Coordination(format!("root region data is not UTF-8: {}", e))
        })?;
        text.trim().parse()
    }
}

impl FromStr for RegionLocation {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| StrataError::Coordination(format!("expected host:port, got '{}'", s)))?;

        if host.is_empty() {
            return Err(StrataError::Coordination(format!("missing host in '{}'", s)));
        }

        let port = port
            .parse::<u16>()
            .map_err(|_| StrataError::Coordination(format!("invalid port in '{}'", s)))?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for RegionLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Snapshot of what the client knows about the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterMetadata {
    /// Where the root region lives; `None` before the first notification or
    /// after the node was deleted
    pub root_region: Option<RegionLocation>,

    /// Bumped on every change; 0 means never populated
    pub version: u64,

    /// Coordination session lost; this view is frozen
    pub degraded: bool,
}

impl ClusterMetadata {
    pub fn with_root(root_region: RegionLocation) -> Self {
        Self {
            root_region: Some(root_region),
            version: 1,
            degraded: false,
        }
    }
}
