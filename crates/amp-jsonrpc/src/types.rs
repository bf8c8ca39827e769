//! JSON-RPC 2.0 envelope types.
//!
//! Grounded on `original_source/.../acp/transport.py`'s `JsonRpcProcessor`:
//! a request carries `method` + `id`, a notification carries `method` with
//! no `id`, and a response carries `result` xor `error` with no `method`.
//! Error codes follow the JSON-RPC 2.0 spec's reserved ranges rather than
//! the original's `acp` SDK (an external dependency not present in
//! `original_source/`, so its exact custom codes aren't recoverable) —
//! documented as an independent decision in `DESIGN.md`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
/// Reserved server-error range (JSON-RPC 2.0 §5.1): used for every
/// protocol-taxonomy error that isn't already one of the standard codes.
pub const SERVER_ERROR_BASE: i64 = -32000;

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    #[must_use]
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
}

impl JsonRpcNotification {
    #[must_use]
    pub fn new(method: &'static str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Map a [`amp_protocol::ProtocolError`] onto a JSON-RPC error, preserving
/// the wire taxonomy code as `data.code` so a client can still branch on it.
#[must_use]
pub fn from_protocol_error(err: &amp_protocol::ProtocolError) -> JsonRpcError {
    let code = match err {
        amp_protocol::ProtocolError::Parse(_) => PARSE_ERROR,
        amp_protocol::ProtocolError::InvalidRequest(_) | amp_protocol::ProtocolError::Validation(_) => INVALID_REQUEST,
        amp_protocol::ProtocolError::UnknownCommand(_) => METHOD_NOT_FOUND,
        amp_protocol::ProtocolError::SessionNotFound(_) => SERVER_ERROR_BASE - 1,
        amp_protocol::ProtocolError::ApprovalNotFound(_) => SERVER_ERROR_BASE - 2,
        amp_protocol::ProtocolError::ToolNotFound(_) => SERVER_ERROR_BASE - 3,
        amp_protocol::ProtocolError::AgentNotFound(_) => SERVER_ERROR_BASE - 4,
        amp_protocol::ProtocolError::BundleNotFound(_) => SERVER_ERROR_BASE - 5,
        _ => INTERNAL_ERROR,
    };
    JsonRpcError {
        code,
        message: err.to_string(),
        data: Some(serde_json::json!({"code": err.code()})),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_has_no_id() {
        let req: JsonRpcRequest = serde_json::from_str(r#"{"method":"session/cancel","params":{}}"#).unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn request_has_id() {
        let req: JsonRpcRequest = serde_json::from_str(r#"{"id":1,"method":"initialize","params":{}}"#).unwrap();
        assert!(!req.is_notification());
    }

    #[test]
    fn session_not_found_maps_to_reserved_range() {
        let err = from_protocol_error(&amp_protocol::ProtocolError::SessionNotFound("x".into()));
        assert_eq!(err.code, SERVER_ERROR_BASE - 1);
        assert_eq!(err.data.unwrap()["code"], "SESSION_NOT_FOUND");
    }

    #[test]
    fn unknown_command_maps_to_method_not_found() {
        let err = from_protocol_error(&amp_protocol::ProtocolError::UnknownCommand("x".into()));
        assert_eq!(err.code, METHOD_NOT_FOUND);
    }
}
