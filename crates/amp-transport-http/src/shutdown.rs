//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Ported from `tron-server::shutdown::ShutdownCoordinator` unchanged in
//! behavior.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default timeout for graceful shutdown before force-exiting.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Coordinates graceful shutdown across all server tasks.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    /// Dynamically registered background task handles (e.g. WS sessions).
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a background task handle for graceful shutdown.
    pub fn register_task(&self, handle: JoinHandle<()>) {
        self.task_handles.lock().push(handle);
    }

    /// Take all registered task handles (drains the list).
    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *self.task_handles.lock())
    }

    /// Get a clone of the cancellation token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Initiate shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether a shutdown has been initiated.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel the token, wait up to `timeout` for all handles to complete,
    /// then abort whatever is left.
    pub async fn graceful_shutdown(&self, handles: Vec<JoinHandle<()>>, timeout: Option<Duration>) {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);

        self.shutdown();

        let mut all_handles = handles;
        all_handles.extend(self.take_tasks());

        info!(
            task_count = all_handles.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let abort_handles: Vec<_> = all_handles.iter().map(JoinHandle::abort_handle).collect();

        match tokio::time::timeout(timeout, futures::future::join_all(all_handles)).await {
            Ok(_) => info!("all shutdown tasks completed"),
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "shutdown timed out, aborting remaining tasks");
                for handle in &abort_handles {
                    handle.abort();
                }
            }
        }
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
