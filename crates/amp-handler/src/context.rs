//! Dependency-injection context shared by every command handler.

use std::sync::Arc;
use std::time::Instant;

use amp_bus::EventBus;
use amp_runtime::SessionManager;

use crate::catalog::BundleCatalog;

/// Everything a [`crate::dispatch::CommandHandler`] needs, grounded on
/// `tron-server`'s `RpcContext` (narrowed to this runtime's actual
/// dependencies — no LLM provider or tool registry, since those live behind
/// the opaque `BundleHost` boundary).
pub struct HandlerContext {
    pub session_manager: Arc<SessionManager>,
    pub bus: EventBus,
    pub bundle_catalog: Arc<BundleCatalog>,
    pub server_start_time: Instant,
    pub protocol_version: &'static str,
    pub server_version: &'static str,
}

impl HandlerContext {
    #[must_use]
    pub fn new(session_manager: Arc<SessionManager>, bus: EventBus) -> Self {
        Self {
            session_manager,
            bus,
            bundle_catalog: Arc::new(BundleCatalog::default()),
            server_start_time: Instant::now(),
            protocol_version: "1",
            server_version: env!("CARGO_PKG_VERSION"),
        }
    }
}
