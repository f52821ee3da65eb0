//! Server configuration
//!
//! Everything the binary can tune, with defaults that match a stock Redis
//! install where a counterpart exists.

use crate::connection::{ConnectionLimits, DEFAULT_MAX_BUFFER_SIZE};
use crate::protocol::parser::DEFAULT_MAX_DEPTH;
use crate::storage::ExpiryConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// Shortest sweep interval accepted; a zero interval would never back off.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Runtime configuration for a redlite server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Network
    // -------------------------------------------------------------------------
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    // -------------------------------------------------------------------------
    // Per-connection limits
    // -------------------------------------------------------------------------
    /// Deepest array nesting accepted in a request
    pub max_nesting_depth: usize,

    /// Bytes a client may have buffered for one unfinished request
    pub max_buffer_size: usize,

    // -------------------------------------------------------------------------
    // Expiry
    // -------------------------------------------------------------------------
    pub expiry: ExpiryConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
            expiry: ExpiryConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_nesting_depth: self.max_nesting_depth,
            max_buffer_size: self.max_buffer_size,
        }
    }

    /// Sets the first sweep interval, widening the adaptive bounds if the
    /// new interval falls outside them. Intervals under 1ms are raised to
    /// 1ms.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        self.expiry.base_interval = interval;
        self.expiry.min_interval = self.expiry.min_interval.min(interval);
        self.expiry.max_interval = self.expiry.max_interval.max(interval);
        self
    }
}
