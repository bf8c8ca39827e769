//! `SessionManager`: session CRUD, lifecycle orchestration, and the
//! filesystem store/bundle factory it is wired to (`SPEC_FULL.md` §4.3).

use std::path::PathBuf;
use std::sync::Arc;

use amp_bundle::{BundleDefinition, BundleFactory};
use amp_bus::EventBus;
use amp_protocol::ProtocolError;
use amp_store::{Metadata, SessionFilter, SessionStore};
use chrono::Utc;
use dashmap::DashMap;
use tracing::instrument;

use crate::session::Session;
use crate::state::SessionState;

/// Owns every live [`Session`] plus the dependencies needed to create and
/// resume them: a persistence store (optional — `--no-persist` disables
/// it), an event bus, and a bundle factory.
pub struct SessionManager {
    sessions: DashMap<String, Arc<Session>>,
    storage_dir: Option<PathBuf>,
    bus: EventBus,
    bundle_factory: Arc<dyn BundleFactory>,
}

/// Result of forking a session (spawning a child).
pub struct ForkSessionResult {
    pub new_session_id: String,
    pub parent_session_id: String,
}

impl SessionManager {
    #[must_use]
    pub fn new(storage_dir: Option<PathBuf>, bus: EventBus, bundle_factory: Arc<dyn BundleFactory>) -> Self {
        Self {
            sessions: DashMap::new(),
            storage_dir,
            bus,
            bundle_factory,
        }
    }

    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    #[must_use]
    pub fn storage_dir(&self) -> Option<&PathBuf> {
        self.storage_dir.as_ref()
    }

    #[must_use]
    pub fn bundle_factory(&self) -> &Arc<dyn BundleFactory> {
        &self.bundle_factory
    }

    fn store_for(&self, cwd: &str) -> Option<SessionStore> {
        self.storage_dir.as_ref().map(|dir| SessionStore::new(dir.clone(), cwd))
    }

    /// Create and initialize a new top-level session.
    #[instrument(skip(self, definition), fields(cwd = %cwd))]
    pub async fn create_session(
        &self,
        cwd: &str,
        definition: BundleDefinition,
    ) -> Result<Arc<Session>, ProtocolError> {
        let session_id = amp_protocol::ids::new_session_id();
        self.create_session_with_id(session_id, cwd, None, definition).await
    }

    /// Create and initialize a new top-level session with an ACP-transport
    /// id (`acp_` + 12 hex) instead of the default `sess_` prefix.
    #[instrument(skip(self, definition), fields(cwd = %cwd))]
    pub async fn create_acp_session(&self, cwd: &str, definition: BundleDefinition) -> Result<Arc<Session>, ProtocolError> {
        let session_id = amp_protocol::ids::new_acp_session_id();
        self.create_session_with_id(session_id, cwd, None, definition).await
    }

    /// Spawn a sub-session owned by `parent_session_id`.
    pub async fn fork_session(
        &self,
        parent_session_id: &str,
        cwd: &str,
        definition: BundleDefinition,
    ) -> Result<ForkSessionResult, ProtocolError> {
        let session_id = amp_protocol::ids::new_sub_session_id(parent_session_id);
        let session = self
            .create_session_with_id(session_id.clone(), cwd, Some(parent_session_id.to_string()), definition)
            .await?;
        Ok(ForkSessionResult {
            new_session_id: session.session_id.clone(),
            parent_session_id: parent_session_id.to_string(),
        })
    }

    async fn create_session_with_id(
        &self,
        session_id: String,
        cwd: &str,
        parent_session_id: Option<String>,
        definition: BundleDefinition,
    ) -> Result<Arc<Session>, ProtocolError> {
        let now = Utc::now().to_rfc3339();
        let metadata = Metadata {
            created: now.clone(),
            updated: now,
            cwd: Some(cwd.to_string()),
            parent_session_id,
            state: SessionState::Created.as_str().to_string(),
            ..Default::default()
        };
        let session = Arc::new(Session::new(session_id.clone(), metadata, self.store_for(cwd)));
        session.initialize(self.bundle_factory.as_ref(), &definition).await?;
        self.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.get(session_id).map(|e| e.clone())
    }

    /// Resume a session: active sessions are returned directly; otherwise
    /// it is reconstructed from disk into `ready`.
    pub async fn resume_session(&self, cwd: &str, session_id: &str) -> Result<Arc<Session>, ProtocolError> {
        if let Some(session) = self.get(session_id) {
            return Ok(session);
        }
        let store = self
            .store_for(cwd)
            .ok_or_else(|| ProtocolError::SessionNotFound(session_id.to_string()))?;
        let (transcript, metadata) = store.load(session_id).await?;
        let session = Arc::new(Session::from_stored(session_id.to_string(), metadata, transcript, Some(store)));
        self.sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    pub async fn list_sessions(&self, cwd: &str, filter: &SessionFilter) -> Result<Vec<amp_store::SessionSummary>, ProtocolError> {
        let Some(store) = self.store_for(cwd) else {
            return Ok(Vec::new());
        };
        Ok(store.list_sessions(filter).await?)
    }

    /// Removes active state and, if persisted, the stored session
    /// directory. A session with an execution in flight is cancelled first
    /// and its current turn is allowed to unwind before removal.
    pub async fn delete_session(&self, cwd: &str, session_id: &str) -> Result<(), ProtocolError> {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            if session.state() == SessionState::Running {
                session.cancel();
            }
        }
        if let Some(store) = self.store_for(cwd) {
            store.delete_session(session_id).await?;
        }
        Ok(())
    }

    /// Removes the session from the active map, flushing state to disk.
    pub async fn end_session(&self, session_id: &str) -> Result<(), ProtocolError> {
        if let Some((_, session)) = self.sessions.remove(session_id) {
            session.flush().await?;
        }
        Ok(())
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_bundle::fixture::FixtureBundleFactory;

    fn manager(storage_dir: Option<PathBuf>) -> SessionManager {
        SessionManager::new(storage_dir, EventBus::new(), Arc::new(FixtureBundleFactory))
    }

    #[tokio::test]
    async fn create_session_initializes_into_ready() {
        let mgr = manager(None);
        let session = mgr.create_session("/work", BundleDefinition::default()).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(mgr.active_count(), 1);
    }

    #[tokio::test]
    async fn create_acp_session_uses_acp_prefix() {
        let mgr = manager(None);
        let session = mgr.create_acp_session("/work", BundleDefinition::default()).await.unwrap();
        assert!(session.session_id.starts_with("acp_"));
    }

    #[tokio::test]
    async fn fork_session_produces_sub_session_id() {
        let mgr = manager(None);
        let parent = mgr.create_session("/work", BundleDefinition::default()).await.unwrap();
        let fork = mgr.fork_session(&parent.session_id, "/work", BundleDefinition::default()).await.unwrap();
        assert!(amp_protocol::ids::is_sub_session(&fork.new_session_id));
        assert!(fork.new_session_id.starts_with(&parent.session_id));
    }

    #[tokio::test]
    async fn resume_persisted_session_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let storage_dir = dir.path().to_path_buf();
        let mgr = manager(Some(storage_dir.clone()));
        let session = mgr.create_session("/work", BundleDefinition::default()).await.unwrap();
        let id = session.session_id.clone();
        mgr.end_session(&id).await.unwrap();
        assert_eq!(mgr.active_count(), 0);

        let mgr2 = manager(Some(storage_dir));
        let resumed = mgr2.resume_session("/work", &id).await.unwrap();
        assert_eq!(resumed.session_id, id);
        assert_eq!(resumed.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn delete_session_removes_from_active_map() {
        let mgr = manager(None);
        let session = mgr.create_session("/work", BundleDefinition::default()).await.unwrap();
        mgr.delete_session("/work", &session.session_id).await.unwrap();
        assert!(mgr.get(&session.session_id).is_none());
    }
}
