//! HTTP/WebSocket server configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the HTTP transport, grounded on
/// `tron-server::config::ServerConfig` (same field set and defaults — the
/// heartbeat fields now also govern the spec's wire-level `ping`/`pong`
/// WebSocket message pair, not just frame-level liveness).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this many missed pongs).
    pub heartbeat_timeout_secs: u64,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}
