//! A single session: lifecycle state, transcript, bundle host, and the
//! approval/display back-channels (`SPEC_FULL.md` §4.3).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use amp_bundle::{BundleDefinition, BundleEvent, BundleFactory, BundleHost};
use amp_protocol::ProtocolError;
use amp_store::{Message, Metadata, SessionStore};
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::approval::ApprovalBackChannel;
use crate::display::DisplayBackChannel;
use crate::mapping::{MappedEvent, map_bundle_event};
use crate::state::SessionState;
use crate::turn::TurnEvent;

const DEFAULT_APPROVAL_TIMEOUT_SECS: f64 = 120.0;

/// A session's mutable runtime state plus its back-channels.
pub struct Session {
    pub session_id: String,
    state: Mutex<SessionState>,
    bundle: Mutex<Option<Arc<dyn BundleHost>>>,
    transcript: Mutex<Vec<Message>>,
    metadata: Mutex<Metadata>,
    cancel_token: Mutex<CancellationToken>,
    show_thinking: AtomicBool,
    pub approvals: ApprovalBackChannel,
    pub display: Arc<DisplayBackChannel>,
    store: Option<SessionStore>,
}

impl Session {
    #[must_use]
    pub fn new(session_id: String, metadata: Metadata, store: Option<SessionStore>) -> Self {
        Self {
            session_id,
            state: Mutex::new(SessionState::Created),
            bundle: Mutex::new(None),
            transcript: Mutex::new(Vec::new()),
            metadata: Mutex::new(metadata),
            cancel_token: Mutex::new(CancellationToken::new()),
            show_thinking: AtomicBool::new(true),
            approvals: ApprovalBackChannel::new(),
            display: Arc::new(DisplayBackChannel::new()),
            store,
        }
    }

    /// Reconstruct a session already in `ready` from stored history
    /// (used by `resume`).
    #[must_use]
    pub fn from_stored(
        session_id: String,
        metadata: Metadata,
        transcript: Vec<Message>,
        store: Option<SessionStore>,
    ) -> Self {
        let session = Self::new(session_id, metadata, store);
        *session.transcript.lock() = transcript;
        *session.state.lock() = SessionState::Ready;
        session
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    #[must_use]
    pub fn metadata(&self) -> Metadata {
        self.metadata.lock().clone()
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<Message> {
        self.transcript.lock().clone()
    }

    pub fn set_show_thinking(&self, value: bool) {
        self.show_thinking.store(value, Ordering::Relaxed);
    }

    fn touch_updated(&self) {
        self.metadata.lock().updated = Utc::now().to_rfc3339();
    }

    /// May only be called in `created`. Loads the bundle; on failure the
    /// session transitions to `error` with the reason preserved.
    pub async fn initialize(
        &self,
        factory: &dyn BundleFactory,
        definition: &BundleDefinition,
    ) -> Result<(), ProtocolError> {
        {
            let state = self.state.lock();
            if *state != SessionState::Created {
                return Err(ProtocolError::validation(format!(
                    "initialize requires state `created`, session is `{state}`"
                )));
            }
        }
        match factory.create(definition).await {
            Ok(host) => {
                let name = host.name().to_string();
                *self.bundle.lock() = Some(host);
                self.metadata.lock().bundle = Some(name);
                *self.state.lock() = SessionState::Ready;
                self.touch_updated();
                Ok(())
            }
            Err(err) => {
                *self.state.lock() = SessionState::Error;
                self.metadata.lock().error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// May only be called in `ready` or `paused`. Streams mapped events on
    /// `emit` until completion, cancellation, or error; persists the turn
    /// afterward.
    pub async fn execute(&self, prompt: Value, emit: mpsc::Sender<TurnEvent>) -> Result<(), ProtocolError> {
        {
            let state = self.state.lock();
            if !matches!(*state, SessionState::Ready | SessionState::Paused) {
                return Err(ProtocolError::validation(format!(
                    "execute requires state `ready` or `paused`, session is `{state}`"
                )));
            }
        }

        let host = self
            .bundle
            .lock()
            .clone()
            .ok_or_else(|| ProtocolError::validation("session has no initialized bundle"))?;

        let cancel_token = {
            let mut slot = self.cancel_token.lock();
            *slot = CancellationToken::new();
            slot.clone()
        };

        self.metadata.lock().turn_count += 1;
        *self.state.lock() = SessionState::Running;
        self.touch_updated();

        let user_text = extract_prompt_text(&prompt);
        let user_message = Message {
            role: "user".to_string(),
            content: prompt.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.transcript.lock().push(user_message.clone());
        if let Some(store) = &self.store {
            store.append_message(&self.session_id, &user_message).await.ok();
        }
        let _ = emit.send(TurnEvent::new("prompt.submit", json!({"text": user_text}))).await;

        let mut stream = host.execute(prompt).await;
        let mut assembled_text = String::new();
        let mut turn_error: Option<String> = None;

        loop {
            let next = tokio::select! {
                () = cancel_token.cancelled() => None,
                item = stream.next() => item,
            };
            let Some(bundle_event) = next else {
                if cancel_token.is_cancelled() {
                    host.cancel();
                    self.approvals.cancel_all();
                    *self.state.lock() = SessionState::Cancelled;
                } else {
                    *self.state.lock() = if turn_error.is_some() {
                        SessionState::Error
                    } else {
                        SessionState::Ready
                    };
                }
                break;
            };

            if let BundleEvent::ContentBlockEnd { block, .. } = &bundle_event {
                if let Some(text) = block.get("text").and_then(Value::as_str) {
                    assembled_text.push_str(text);
                }
            }
            if let BundleEvent::Error { message } = &bundle_event {
                turn_error = Some(message.clone());
            }

            match map_bundle_event(self.show_thinking.load(Ordering::Relaxed), &bundle_event) {
                MappedEvent::Emit(turn_event) => {
                    let _ = emit.send(turn_event).await;
                }
                MappedEvent::Suppressed => {}
                MappedEvent::NeedsApproval { prompt, options, timeout_secs, default } => {
                    *self.state.lock() = SessionState::WaitingApproval;
                    let timeout = if timeout_secs > 0.0 {
                        Duration::from_secs_f64(timeout_secs)
                    } else {
                        Duration::from_secs_f64(DEFAULT_APPROVAL_TIMEOUT_SECS)
                    };
                    let _choice = self.approvals.request_approval(&emit, prompt, options, timeout, default).await;
                    *self.state.lock() = SessionState::Running;
                }
            }
        }

        if !assembled_text.is_empty() || turn_error.is_none() {
            let assistant_message = Message {
                role: "assistant".to_string(),
                content: json!({"text": assembled_text}),
                timestamp: Utc::now().to_rfc3339(),
            };
            self.transcript.lock().push(assistant_message.clone());
            if let Some(store) = &self.store {
                store.append_message(&self.session_id, &assistant_message).await.ok();
            }
        }
        self.touch_updated();
        if let Some(store) = &self.store {
            store.save_metadata(&self.session_id, &self.metadata.lock().clone()).await.ok();
        }

        match turn_error {
            Some(message) => Err(ProtocolError::ExecutionError(message)),
            None => Ok(()),
        }
    }

    /// Reset the session: may only be called outside `running`. Clears the
    /// transcript unless `preserve_history` is set, and optionally
    /// re-initializes against a new bundle definition.
    pub async fn reset(
        &self,
        factory: &dyn BundleFactory,
        definition: Option<&BundleDefinition>,
        preserve_history: bool,
    ) -> Result<(), ProtocolError> {
        {
            let state = self.state.lock();
            if *state == SessionState::Running {
                return Err(ProtocolError::validation("cannot reset a session while it is running"));
            }
        }
        if !preserve_history {
            self.transcript.lock().clear();
            self.metadata.lock().turn_count = 0;
        }
        if let Some(def) = definition {
            let host = factory.create(def).await?;
            let name = host.name().to_string();
            *self.bundle.lock() = Some(host);
            self.metadata.lock().bundle = Some(name);
        }
        *self.state.lock() = SessionState::Ready;
        self.touch_updated();
        if let Some(store) = &self.store {
            store
                .save(&self.session_id, &self.transcript.lock().clone(), &self.metadata.lock().clone())
                .await
                .map_err(ProtocolError::from)?;
        }
        Ok(())
    }

    /// Sets the cancel signal, cancels all pending approvals (resolving
    /// them to "deny"), and forwards cancel to the bundle host.
    pub fn cancel(&self) {
        self.cancel_token.lock().cancel();
        self.approvals.cancel_all();
        if let Some(host) = self.bundle.lock().clone() {
            host.cancel();
        }
    }

    pub async fn flush(&self) -> Result<(), ProtocolError> {
        if let Some(store) = &self.store {
            store
                .save(&self.session_id, &self.transcript.lock().clone(), &self.metadata.lock().clone())
                .await
                .map_err(ProtocolError::from)?;
        }
        Ok(())
    }
}

fn extract_prompt_text(prompt: &Value) -> String {
    match prompt {
        Value::String(s) => s.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_bundle::fixture::{FixtureBundleFactory, FixtureBundleHost};

    fn meta() -> Metadata {
        Metadata {
            created: Utc::now().to_rfc3339(),
            updated: Utc::now().to_rfc3339(),
            state: "created".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn execute_before_initialize_is_rejected() {
        let session = Session::new("sess_1".into(), meta(), None);
        let (tx, _rx) = mpsc::channel(8);
        let err = session.execute(json!("hi"), tx).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn initialize_then_execute_yields_text_and_returns_to_ready() {
        let session = Session::new("sess_1".into(), meta(), None);
        session.initialize(&FixtureBundleFactory, &BundleDefinition::default()).await.unwrap();
        assert_eq!(session.state(), SessionState::Ready);

        let (tx, mut rx) = mpsc::channel(32);
        let handle = tokio::spawn(async move {
            let s = session;
            s.execute(json!("say hi"), tx).await.unwrap();
            s
        });
        let mut saw_delta = false;
        while let Some(ev) = rx.recv().await {
            if ev.event_type == "content.delta" {
                saw_delta = true;
            }
        }
        let session = handle.await.unwrap();
        assert!(saw_delta);
        assert_eq!(session.state(), SessionState::Ready);
        assert_eq!(session.transcript().len(), 2);
    }

    #[tokio::test]
    async fn approval_flow_round_trips_through_waiting_approval() {
        let host = Arc::new(FixtureBundleHost::new("fixture", true));
        let session = Arc::new(Session::new("sess_1".into(), meta(), None));
        *session.bundle.lock() = Some(host);
        *session.state.lock() = SessionState::Ready;

        let (tx, mut rx) = mpsc::channel(32);
        let session2 = session.clone();
        let handle = tokio::spawn(async move { session2.execute(json!("hi"), tx).await });

        loop {
            let ev = rx.recv().await.unwrap();
            if ev.event_type == "approval.required" {
                let request_id = ev.data["request_id"].as_str().unwrap().to_string();
                assert!(session.approvals.handle_response(&request_id, "Allow once"));
                break;
            }
        }
        while rx.recv().await.is_some() {}
        handle.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn reset_clears_transcript_unless_preserved() {
        let session = Session::new("sess_1".into(), meta(), None);
        session.initialize(&FixtureBundleFactory, &BundleDefinition::default()).await.unwrap();
        let (tx, mut rx) = mpsc::channel(32);
        session.execute(json!("hi"), tx).await.unwrap();
        while rx.try_recv().is_ok() {}
        assert_eq!(session.transcript().len(), 2);

        session.reset(&FixtureBundleFactory, None, false).await.unwrap();
        assert_eq!(session.transcript().len(), 0);
        assert_eq!(session.state(), SessionState::Ready);
    }

    #[tokio::test]
    async fn cancel_unblocks_pending_approval_with_deny() {
        let host = Arc::new(FixtureBundleHost::new("fixture", true));
        let session = Arc::new(Session::new("sess_1".into(), meta(), None));
        *session.bundle.lock() = Some(host);
        *session.state.lock() = SessionState::Ready;

        let (tx, mut rx) = mpsc::channel(32);
        let session2 = session.clone();
        let handle = tokio::spawn(async move { session2.execute(json!("hi"), tx).await });

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, "approval.required");
        session.cancel();
        while rx.recv().await.is_some() {}
        handle.await.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Cancelled);
    }
}
