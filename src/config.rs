//! Configuration for the Strata client
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{Result, StrataError};

/// Main configuration for a Strata client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -------------------------------------------------------------------------
    // Buffering Configuration
    // -------------------------------------------------------------------------
    /// Max mutations buffered per table before a flush is forced
    pub max_buffered_count: usize,

    /// Max time (milliseconds) a mutation may wait in a buffer before a flush
    pub max_buffer_delay_ms: u64,

    // -------------------------------------------------------------------------
    // Execution Configuration
    // -------------------------------------------------------------------------
    /// Number of flush-execution workers
    pub worker_pool_size: usize,

    /// Max time (milliseconds) a batch may spend in the submitter before every
    /// operation in it is failed. 0 disables the timeout.
    pub flush_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Coordination Configuration
    // -------------------------------------------------------------------------
    /// Coordination service quorum (comma separated host:port list)
    pub quorum_spec: String,

    /// Root path of the store's nodes inside the coordination service
    pub base_path: String,

    /// Delay between reconnection attempts (milliseconds)
    pub reconnect_backoff_ms: u64,

    /// Give up reconnecting after this many attempts. 0 retries forever.
    pub max_reconnect_attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_buffered_count: 1000,
            max_buffer_delay_ms: 1000,
            worker_pool_size: 4,
            flush_timeout_ms: 30_000,
            quorum_spec: "localhost:2181".to_string(),
            base_path: "/hbase".to_string(),
            reconnect_backoff_ms: 500,
            max_reconnect_attempts: 0,
        }
    }
}

impl ClientConfig {
    /// Create a new config builder
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Check that the buffering and execution limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_buffered_count == 0 {
            return Err(StrataError::Config(
                "max_buffered_count must be at least 1".to_string(),
            ));
        }
        if self.max_buffer_delay_ms == 0 {
            return Err(StrataError::Config(
                "max_buffer_delay_ms must be at least 1".to_string(),
            ));
        }
        if self.worker_pool_size == 0 {
            return Err(StrataError::Config(
                "worker_pool_size must be at least 1".to_string(),
            ));
        }
        if !self.base_path.starts_with('/') {
            return Err(StrataError::Config(format!(
                "base_path must be absolute, got '{}'",
                self.base_path
            )));
        }
        Ok(())
    }

    pub fn max_buffer_delay(&self) -> Duration {
        Duration::from_millis(self.max_buffer_delay_ms)
    }

    /// Flush timeout, or `None` when disabled
    pub fn flush_timeout(&self) -> Option<Duration> {
        if self.flush_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.flush_timeout_ms))
        }
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    /// Path of the node holding the root region location
    pub fn root_region_path(&self) -> String {
        format!("{}/root-region-server", self.base_path.trim_end_matches('/'))
    }
}

/// Builder for ClientConfig
#[derive(Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Set the per-table buffered mutation limit
    pub fn max_buffered_count(mut self, count: usize) -> Self {
        self.config.max_buffered_count = count;
        self
    }

    /// Set the max buffering delay (in milliseconds)
    pub fn max_buffer_delay_ms(mut self, ms: u64) -> Self {
        self.config.max_buffer_delay_ms = ms;
        self
    }

    /// Set the number of flush workers
    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.config.worker_pool_size = size;
        self
    }

    /// Set the flush timeout (in milliseconds, 0 disables)
    pub fn flush_timeout_ms(mut self, ms: u64) -> Self {
        self.config.flush_timeout_ms = ms;
        self
    }

    /// Set the coordination quorum
    pub fn quorum_spec(mut self, spec: impl Into<String>) -> Self {
        self.config.quorum_spec = spec.into();
        self
    }

    /// Set the coordination base path
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.config.base_path = path.into();
        self
    }

    /// Set the reconnect backoff (in milliseconds)
    pub fn reconnect_backoff_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_backoff_ms = ms;
        self
    }

    /// Set the max reconnect attempts (0 = unlimited)
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.config.max_reconnect_attempts = attempts;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}
