//! The session lifecycle state machine.

use serde::{Deserialize, Serialize};

/// ```text
/// created ──initialize──▶ ready ──execute──▶ running ──┬─▶ ready
///                            ▲                         ├─▶ cancelled
///                            │                         ├─▶ error
///               resume───────┘                         └─▶ waiting_approval ──respond──▶ running
/// ```
///
/// `paused` and `completed` are reachable only through explicit API calls
/// (`pause`/`mark_completed`), not through the diagram above; `execute` also
/// accepts a session in `paused`, resuming it into `running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Created,
    Ready,
    Running,
    WaitingApproval,
    Paused,
    Completed,
    Error,
    Cancelled,
}

impl SessionState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::WaitingApproval => "waiting_approval",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
