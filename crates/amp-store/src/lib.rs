//! # amp-store
//!
//! Filesystem-backed persistence for sessions: one directory per session
//! holding `metadata.json` (whole-file, atomically rewritten) and
//! `transcript.jsonl` (append-only, one message per line).
#![deny(unsafe_code)]

pub mod error;
pub mod model;
pub mod slug;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::io::AsyncWriteExt;

pub use error::StoreError;
pub use model::{Message, Metadata, SessionFilter, SessionSummary};

const METADATA_FILE: &str = "metadata.json";
const TRANSCRIPT_FILE: &str = "transcript.jsonl";

/// A filesystem-backed store rooted at `<storage_dir>/<project_slug>/sessions`.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_root: PathBuf,
}

impl SessionStore {
    /// `storage_dir` is the top-level persistence root (e.g.
    /// `~/.amplifier/projects`); `workspace_path` is the absolute path of
    /// the client's working directory, encoded into a project slug.
    #[must_use]
    pub fn new(storage_dir: impl Into<PathBuf>, workspace_path: &str) -> Self {
        let project_slug = slug::encode_project_slug(workspace_path);
        Self {
            sessions_root: storage_dir.into().join(project_slug).join("sessions"),
        }
    }

    /// Construct directly from an already-resolved sessions directory (used
    /// by tests, which want a bare temp directory with no slug nesting).
    #[must_use]
    pub fn at(sessions_root: impl Into<PathBuf>) -> Self {
        Self {
            sessions_root: sessions_root.into(),
        }
    }

    fn validate_session_id(id: &str) -> Result<(), StoreError> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id.contains('.') {
            return Err(StoreError::InvalidSessionId(id.to_string()));
        }
        Ok(())
    }

    fn session_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        Self::validate_session_id(id)?;
        Ok(self.sessions_root.join(id))
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
        let tmp = path.with_extension("tmp");
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        {
            let mut f = tokio::fs::File::create(&tmp).await?;
            f.write_all(contents).await?;
            f.flush().await?;
        }
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Atomically write both `metadata.json` and `transcript.jsonl`.
    pub async fn save(
        &self,
        id: &str,
        transcript: &[Message],
        metadata: &Metadata,
    ) -> Result<(), StoreError> {
        let dir = self.session_dir(id)?;
        tokio::fs::create_dir_all(&dir).await?;
        self.save_metadata(id, metadata).await?;
        let mut body = String::new();
        for msg in transcript {
            body.push_str(&serde_json::to_string(msg)?);
            body.push('\n');
        }
        Self::write_atomic(&dir.join(TRANSCRIPT_FILE), body.as_bytes()).await?;
        Ok(())
    }

    /// Load a session's full transcript and metadata.
    pub async fn load(&self, id: &str) -> Result<(Vec<Message>, Metadata), StoreError> {
        let dir = self.session_dir(id)?;
        if !dir.is_dir() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let metadata = self.load_metadata(id).await?.ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let transcript = self.read_transcript(&dir).await?;
        Ok((transcript, self.reconcile_turn_count(metadata, &transcript)))
    }

    async fn read_transcript(&self, dir: &Path) -> Result<Vec<Message>, StoreError> {
        let path = dir.join(TRANSCRIPT_FILE);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| serde_json::from_str(l).map_err(StoreError::from))
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn reconcile_turn_count(&self, mut metadata: Metadata, transcript: &[Message]) -> Metadata {
        let user_turns = transcript.iter().filter(|m| m.role == "user").count() as u64;
        if metadata.turn_count < user_turns {
            metadata.turn_count = user_turns;
        }
        metadata
    }

    /// Whole-file rewrite of `metadata.json`.
    pub async fn save_metadata(&self, id: &str, metadata: &Metadata) -> Result<(), StoreError> {
        let dir = self.session_dir(id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(metadata)?;
        Self::write_atomic(&dir.join(METADATA_FILE), &body).await
    }

    /// Returns `None` if the session directory or its metadata file is absent.
    pub async fn load_metadata(&self, id: &str) -> Result<Option<Metadata>, StoreError> {
        let dir = self.session_dir(id)?;
        let path = dir.join(METADATA_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Append one message to `transcript.jsonl`. System/developer role
    /// messages are silently dropped (never persisted).
    pub async fn append_message(&self, id: &str, message: &Message) -> Result<(), StoreError> {
        if !message.is_persisted_role() {
            return Ok(());
        }
        let dir = self.session_dir(id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(TRANSCRIPT_FILE))
            .await?;
        f.write_all(line.as_bytes()).await?;
        f.flush().await?;
        Ok(())
    }

    /// Scan the store directory for sessions matching `filter`.
    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionSummary>, StoreError> {
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.sessions_root).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            if filter.top_level_only && amp_protocol::ids::is_sub_session(&id) {
                continue;
            }
            let Some(metadata) = self.load_metadata(&id).await? else {
                continue;
            };
            if let Some(min) = filter.min_turns {
                if metadata.turn_count < min {
                    continue;
                }
            }
            if let Some(ref want) = filter.state {
                if &metadata.state != want {
                    continue;
                }
            }
            out.push(SessionSummary {
                session_id: id,
                metadata,
            });
        }
        out.sort_by(|a, b| b.metadata.updated.cmp(&a.metadata.updated));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    /// Prefix match a partial session id against stored sessions.
    pub async fn find_session(&self, partial_id: &str) -> Result<String, StoreError> {
        let mut entries = tokio::fs::read_dir(&self.sessions_root).await?;
        let mut matches = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let id = entry.file_name().to_string_lossy().into_owned();
            if id.starts_with(partial_id) {
                matches.push(id);
            }
        }
        match matches.len() {
            0 => Err(StoreError::NotFound(partial_id.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(StoreError::Ambiguous(partial_id.to_string(), matches)),
        }
    }

    /// Delete a session's whole directory tree.
    pub async fn delete_session(&self, id: &str) -> Result<(), StoreError> {
        let dir = self.session_dir(id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove sessions whose `updated` timestamp is older than `days` ago.
    pub async fn cleanup_old_sessions(&self, days: i64) -> Result<usize, StoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let sessions = self.list_sessions(&SessionFilter::default()).await?;
        let mut removed = 0;
        for session in sessions {
            let Ok(updated) = chrono::DateTime::parse_from_rfc3339(&session.metadata.updated) else {
                continue;
            };
            if updated < cutoff {
                self.delete_session(&session.session_id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
