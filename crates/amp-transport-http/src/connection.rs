//! WebSocket client connection state.
//!
//! Grounded on `tron-server::websocket::connection::ClientConnection` and
//! `tron-server::websocket::broadcast::BroadcastManager`, trimmed to what
//! this transport's `/ws` handler actually needs: unlike the teacher's
//! websocket, a connection here is not bound to a single session and
//! doesn't receive session-wide fan-out — every inbound message carries its
//! own command, dispatched independently — so `broadcast_to_session`/
//! `broadcast_all` have no counterpart. A [`WsConnection`] additionally
//! carries its own `CancellationToken`, used to cancel in-flight dispatches
//! when the socket disconnects (`SPEC_FULL.md` §4.5.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A single connected WebSocket client.
pub struct WsConnection {
    pub id: String,
    tx: mpsc::Sender<String>,
    pub connected_at: Instant,
    pub is_alive: AtomicBool,
    last_pong: Mutex<Instant>,
    pub cancel: CancellationToken,
}

impl WsConnection {
    #[must_use]
    pub fn new(id: String, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
            cancel: CancellationToken::new(),
        }
    }

    /// Send a text message to the client. Returns `false` if the channel is
    /// full or closed.
    pub fn send(&self, message: String) -> bool {
        self.tx.try_send(message).is_ok()
    }

    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        match serde_json::to_string(value) {
            Ok(json) => self.send(json),
            Err(_) => false,
        }
    }

    /// Mark the connection as alive (any inbound message counts, not just
    /// wire-level pong).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag for heartbeat.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

/// Tracks live connections for `/health` and `max_connections` enforcement.
pub struct ConnectionRegistry {
    connections: Mutex<std::collections::HashMap<String, Arc<WsConnection>>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn add(&self, connection: Arc<WsConnection>) {
        self.connections.lock().insert(connection.id.clone(), connection);
    }

    pub fn remove(&self, connection_id: &str) {
        self.connections.lock().remove(connection_id);
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.lock().len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
