//! Opaque id generation for commands, sessions, and approval requests.

use uuid::Uuid;

fn short_hex() -> String {
    // Last 6 bytes of a v7 UUID are random (not the millisecond timestamp
    // prefix), so two ids minted in the same millisecond still differ.
    let bytes = Uuid::now_v7().into_bytes();
    bytes[10..].iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate a client-style command id (`cmd_` + 12 hex chars).
#[must_use]
pub fn new_command_id() -> String {
    format!("cmd_{}", short_hex())
}

/// Generate a top-level session id (`sess_` + 12 hex chars).
#[must_use]
pub fn new_session_id() -> String {
    format!("sess_{}", short_hex())
}

/// Generate an ACP-transport session id (`acp_` + 12 hex chars).
#[must_use]
pub fn new_acp_session_id() -> String {
    format!("acp_{}", short_hex())
}

/// Generate a sub-session id nested under `parent_id`.
///
/// Sub-session ids always contain `_` so [`is_sub_session`] and the store's
/// `top_level_only` filter can distinguish them from top-level sessions.
#[must_use]
pub fn new_sub_session_id(parent_id: &str) -> String {
    format!("{parent_id}_{}", short_hex())
}

/// A session id denotes a sub-session iff it contains `_`.
#[must_use]
pub fn is_sub_session(session_id: &str) -> bool {
    session_id.contains('_')
}

/// Generate an approval request id (`approval_` + 12 hex chars).
#[must_use]
pub fn new_approval_request_id() -> String {
    format!("approval_{}", short_hex())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_ids_have_expected_shape() {
        let id = new_command_id();
        assert!(id.starts_with("cmd_"));
        assert_eq!(id.len(), "cmd_".len() + 12);
    }

    #[test]
    fn session_ids_are_unique() {
        let a = new_session_id();
        let b = new_session_id();
        assert_ne!(a, b);
    }

    #[test]
    fn top_level_session_is_not_a_sub_session() {
        let id = new_session_id();
        assert!(!is_sub_session(&id));
    }

    #[test]
    fn sub_session_contains_underscore() {
        let parent = new_session_id();
        let child = new_sub_session_id(&parent);
        assert!(is_sub_session(&child));
        assert!(child.starts_with(&parent));
    }
}
