//! Store-specific error type, convertible to [`amp_protocol::ProtocolError`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("ambiguous session id `{0}`: matches {1:?}")]
    Ambiguous(String, Vec<String>),
    #[error("invalid session id `{0}`")]
    InvalidSessionId(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

impl From<StoreError> for amp_protocol::ProtocolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => amp_protocol::ProtocolError::SessionNotFound(id),
            StoreError::InvalidSessionId(id) => {
                amp_protocol::ProtocolError::validation(format!("invalid session id `{id}`"))
            }
            StoreError::Ambiguous(id, matches) => amp_protocol::ProtocolError::validation(format!(
                "ambiguous session id `{id}`: matches {matches:?}"
            )),
            StoreError::Io(e) => amp_protocol::ProtocolError::ExecutionError(e.to_string()),
            StoreError::Serde(e) => amp_protocol::ProtocolError::ExecutionError(e.to_string()),
        }
    }
}
