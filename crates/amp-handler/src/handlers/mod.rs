//! Per-command handlers, one module per command family.

pub mod approval;
pub mod metadata;
pub mod prompt;
pub mod session;
pub mod system;

use amp_protocol::{Command, ProtocolError};

/// Look up a session by id, resuming it from disk first if it is not
/// currently active. `cwd` is only consulted on the resume path.
pub(crate) async fn lookup_session(
    ctx: &crate::context::HandlerContext,
    command: &Command,
) -> Result<std::sync::Arc<amp_runtime::Session>, ProtocolError> {
    let session_id: String = command.required_param("session_id")?;
    if let Some(session) = ctx.session_manager.get(&session_id) {
        return Ok(session);
    }
    let cwd: String = command
        .param("cwd")
        .map_err(|e| ProtocolError::validation(format!("invalid `cwd`: {e}")))?
        .unwrap_or_default();
    ctx.session_manager.resume_session(&cwd, &session_id).await
}
