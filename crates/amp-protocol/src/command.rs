//! The client → server request envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single client request.
///
/// `id` is client-allocated and opaque; every [`crate::Event`] produced in
/// response carries it back as `correlation_id`. `cmd` is a dotted name from
/// a closed set (`session.create`, `prompt.send`, ...); unrecognized values
/// are rejected by the handler with `UNKNOWN_COMMAND`, not by this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: String,
    pub cmd: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Command {
    /// Build a command with an explicit id.
    #[must_use]
    pub fn new(id: impl Into<String>, cmd: impl Into<String>, params: Value) -> Self {
        Self {
            id: id.into(),
            cmd: cmd.into(),
            params,
            timestamp: None,
        }
    }

    /// Build a command, minting a fresh id.
    #[must_use]
    pub fn with_new_id(cmd: impl Into<String>, params: Value) -> Self {
        Self::new(crate::ids::new_command_id(), cmd, params)
    }

    /// Deserialize a parameter field by name, if present.
    ///
    /// Returns `Ok(None)` if `params` is not an object or the field is
    /// absent; returns `Err` only on a type mismatch, propagated by callers
    /// as `VALIDATION_ERROR`.
    pub fn param<T: for<'de> Deserialize<'de>>(
        &self,
        name: &str,
    ) -> Result<Option<T>, serde_json::Error> {
        match self.params.get(name) {
            Some(v) if !v.is_null() => serde_json::from_value(v.clone()).map(Some),
            _ => Ok(None),
        }
    }

    /// Like [`Command::param`] but treats absence as an error.
    pub fn required_param<T: for<'de> Deserialize<'de>>(
        &self,
        name: &str,
    ) -> Result<T, crate::ProtocolError> {
        self.param(name)
            .map_err(|e| crate::ProtocolError::validation(format!("invalid `{name}`: {e}")))?
            .ok_or_else(|| crate::ProtocolError::validation(format!("missing required `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_camel_case() {
        let cmd = Command::new("cmd_1", "session.create", json!({"bundle": "foundation"}));
        let wire = serde_json::to_value(&cmd).unwrap();
        assert_eq!(wire["id"], "cmd_1");
        assert_eq!(wire["cmd"], "session.create");
        let back: Command = serde_json::from_value(wire).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn timestamp_omitted_when_absent() {
        let cmd = Command::new("cmd_1", "ping", Value::Null);
        let wire = serde_json::to_value(&cmd).unwrap();
        assert!(wire.get("timestamp").is_none());
    }

    #[test]
    fn params_default_to_null_when_missing() {
        let cmd: Command = serde_json::from_value(json!({"id": "cmd_1", "cmd": "ping"})).unwrap();
        assert!(cmd.params.is_null());
    }

    #[test]
    fn required_param_missing_is_validation_error() {
        let cmd = Command::new("cmd_1", "prompt.send", json!({}));
        let err = cmd.required_param::<String>("session_id").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn required_param_present() {
        let cmd = Command::new("cmd_1", "prompt.send", json!({"session_id": "sess_abc"}));
        let id: String = cmd.required_param("session_id").unwrap();
        assert_eq!(id, "sess_abc");
    }
}
