//! HTTP + SSE + WebSocket transport (`SPEC_FULL.md` §4.5.2, §4.5.3).
//!
//! Mirrors `tron-server`'s shape (config, shutdown coordinator, connection
//! registry, heartbeat loop, Axum router) adapted to the command/event
//! dispatch envelope in `amp-handler` rather than the teacher's own RPC
//! surface. `/acp/*` routes are not mounted here; `amp-server` merges them
//! in from `amp-jsonrpc` once both transports are wired into one listener.

pub mod config;
pub mod connection;
pub mod heartbeat;
pub mod once;
pub mod server;
pub mod shutdown;
pub mod sse;
pub mod ws;

pub use config::HttpConfig;
pub use connection::{ConnectionRegistry, WsConnection};
pub use server::{AppState, HttpServer};
pub use shutdown::ShutdownCoordinator;
