//! Heartbeat liveness monitoring, ported from
//! `tron-server::websocket::heartbeat::run_heartbeat` unchanged.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::connection::WsConnection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    TimedOut,
    Cancelled,
}

/// At each `interval` tick the alive flag is checked; `max_missed`
/// consecutive misses (computed as `timeout / interval`, clamped to at
/// least 1) marks the connection dead.
pub async fn run_heartbeat(
    connection: Arc<WsConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    let mut missed_pongs: u32 = 0;
    let interval_secs = interval.as_secs().max(1);
    #[allow(clippy::cast_possible_truncation)]
    let max_missed = (timeout.as_secs() / interval_secs).max(1) as u32;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed_pongs = 0;
                } else {
                    missed_pongs += 1;
                    if missed_pongs >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
                connection.is_alive.store(false, Ordering::Relaxed);
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
