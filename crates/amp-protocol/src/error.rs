//! The error taxonomy shared by the handler, runtime, store, and transports.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire-format error body, attached to `error` events and non-streaming
/// HTTP error responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// The full taxonomy, grouped by source (see `SPEC_FULL.md` §7).
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("{0}")]
    Validation(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("approval not found: {0}")]
    ApprovalNotFound(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("agent not found: {0}")]
    AgentNotFound(String),
    #[error("bundle not found: {0}")]
    BundleNotFound(String),

    #[error("bundle error: {0}")]
    BundleError(String),
    #[error("failed to add bundle: {0}")]
    BundleAddFailed(String),
    #[error("failed to remove bundle: {0}")]
    BundleRemoveFailed(String),
    #[error("bundle install error: {0}")]
    BundleInstallError(String),

    #[error("execution error: {0}")]
    ExecutionError(String),
    #[error("handler error: {0}")]
    HandlerError(String),

    #[error("transport closed")]
    TransportClosed,
    #[error("transport error: {0}")]
    TransportError(String),
    #[error("timeout")]
    Timeout,
}

impl ProtocolError {
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Machine-readable wire error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::ApprovalNotFound(_) => "APPROVAL_NOT_FOUND",
            Self::ToolNotFound(_) => "TOOL_NOT_FOUND",
            Self::AgentNotFound(_) => "AGENT_NOT_FOUND",
            Self::BundleNotFound(_) => "BUNDLE_NOT_FOUND",
            Self::BundleError(_) => "BUNDLE_ERROR",
            Self::BundleAddFailed(_) => "BUNDLE_ADD_FAILED",
            Self::BundleRemoveFailed(_) => "BUNDLE_REMOVE_FAILED",
            Self::BundleInstallError(_) => "BUNDLE_INSTALL_ERROR",
            Self::ExecutionError(_) => "EXECUTION_ERROR",
            Self::HandlerError(_) => "HANDLER_ERROR",
            Self::TransportClosed => "transport_closed",
            Self::TransportError(_) => "transport_error",
            Self::Timeout => "timeout",
        }
    }

    /// The HTTP status code a non-streaming endpoint should return.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Parse(_) | Self::InvalidRequest(_) | Self::UnknownCommand(_) | Self::Validation(_) => 400,
            Self::SessionNotFound(_)
            | Self::ApprovalNotFound(_)
            | Self::ToolNotFound(_)
            | Self::AgentNotFound(_)
            | Self::BundleNotFound(_) => 404,
            Self::Timeout => 408,
            _ => 500,
        }
    }

    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            data: None,
        }
    }

    #[must_use]
    pub fn to_body_with_data(&self, data: Value) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            data: Some(data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_taxonomy() {
        assert_eq!(ProtocolError::UnknownCommand("x".into()).code(), "UNKNOWN_COMMAND");
        assert_eq!(ProtocolError::SessionNotFound("x".into()).code(), "SESSION_NOT_FOUND");
        assert_eq!(ProtocolError::TransportClosed.code(), "transport_closed");
    }

    #[test]
    fn http_status_mapping() {
        assert_eq!(ProtocolError::validation("x").http_status(), 400);
        assert_eq!(ProtocolError::SessionNotFound("x".into()).http_status(), 404);
        assert_eq!(ProtocolError::HandlerError("x".into()).http_status(), 500);
    }

    #[test]
    fn to_body_carries_message_and_code() {
        let err = ProtocolError::BundleError("no provider".into());
        let body = err.to_body();
        assert_eq!(body.code, "BUNDLE_ERROR");
        assert!(body.message.contains("no provider"));
        assert!(body.data.is_none());
    }
}
