//! # amp-jsonrpc
//!
//! A thin JSON-RPC 2.0 framing adapter exposing the ACP editor-integration
//! surface (`SPEC_FULL.md` §4.5.4): `initialize`, `session/new`,
//! `session/load`, `session/prompt`, `session/set_mode`, `session/list`, the
//! `session/cancel` notification, and the `session/update` push
//! notification that streams a prompt's events back to the client.
//!
//! Grounded on `original_source/.../acp/handler.py` (method semantics) and
//! `.../acp/transport.py` (message framing, notification-vs-request
//! detection). The concrete stdio/HTTP/WebSocket framing this adapter rides
//! on belongs to `amp-transport-stdio`/`amp-transport-http`/`amp-server`;
//! this crate only owns the method table and the JSON-RPC envelope.
#![deny(unsafe_code)]

pub mod handler;
pub mod http;
pub mod processor;
pub mod types;

pub use handler::AcpHandler;
pub use http::router;
pub use processor::process_message;
pub use types::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
