//! The approval back-channel (`SPEC_FULL.md` §4.6).
//!
//! Grounded on `original_source/.../protocols/approval.py`: cache key is
//! `(prompt, options)` only (see `DESIGN.md` Open Question 2), timeout
//! resolves via substring match against `default`, unknown response
//! choices are accepted with a warning rather than rejected.

use std::collections::HashMap;
use std::time::Duration;

use amp_bundle::ApprovalDefault;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use crate::turn::TurnEvent;

struct PendingEntry {
    sender: oneshot::Sender<String>,
    prompt: String,
    options: Vec<String>,
    emit: mpsc::Sender<TurnEvent>,
}

/// Per-session approval state: the pending-request map and the
/// "always"-decision cache.
#[derive(Default)]
pub struct ApprovalBackChannel {
    pending: Mutex<HashMap<String, PendingEntry>>,
    cache: Mutex<HashMap<String, String>>,
}

fn cache_key(prompt: &str, options: &[String]) -> String {
    format!("{prompt}\u{1}{}", options.join("\u{1}"))
}

fn resolve_default(options: &[String], default: ApprovalDefault) -> String {
    let matches_default = |opt: &str| {
        let lower = opt.to_lowercase();
        match default {
            ApprovalDefault::Allow => lower.contains("allow") || lower.contains("yes"),
            ApprovalDefault::Deny => lower.contains("deny") || lower.contains("no"),
        }
    };
    if let Some(found) = options.iter().find(|o| matches_default(o)) {
        return found.clone();
    }
    match default {
        ApprovalDefault::Allow => options.first().cloned().unwrap_or_default(),
        ApprovalDefault::Deny => options.last().cloned().unwrap_or_default(),
    }
}

impl ApprovalBackChannel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request approval, emitting `approval.required` on `emit` and
    /// suspending until a response, a timeout, or a cached "always"
    /// decision resolves it.
    pub async fn request_approval(
        &self,
        emit: &mpsc::Sender<TurnEvent>,
        prompt: String,
        options: Vec<String>,
        timeout: Duration,
        default: ApprovalDefault,
    ) -> String {
        let key = cache_key(&prompt, &options);
        if let Some(cached) = self.cache.lock().get(&key).cloned() {
            if cached.to_lowercase().contains("always") {
                return cached;
            }
        }

        let request_id = amp_protocol::ids::new_approval_request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            request_id.clone(),
            PendingEntry {
                sender: tx,
                prompt: prompt.clone(),
                options: options.clone(),
                emit: emit.clone(),
            },
        );

        let _ = emit
            .send(TurnEvent::new(
                "approval.required",
                json!({
                    "request_id": request_id,
                    "prompt": prompt,
                    "options": options,
                    "timeout": timeout.as_secs_f64(),
                    "default": match default { ApprovalDefault::Allow => "allow", ApprovalDefault::Deny => "deny" },
                }),
            ))
            .await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(choice)) => choice,
            _ => {
                self.pending.lock().remove(&request_id);
                let applied = resolve_default(&options, default);
                let _ = emit
                    .send(TurnEvent::new(
                        "approval.timeout",
                        json!({"request_id": request_id, "applied_default": applied}),
                    ))
                    .await;
                applied
            }
        }
    }

    /// Route a client's `approval.respond` to the matching pending request.
    /// Returns `false` if `request_id` is unknown (already resolved, timed
    /// out, or never existed).
    pub fn handle_response(&self, request_id: &str, choice: &str) -> bool {
        let Some(entry) = self.pending.lock().remove(request_id) else {
            return false;
        };
        if !entry.options.iter().any(|o| o == choice) {
            tracing::warn!(request_id, choice, "approval choice not among offered options, accepting anyway");
        }
        if choice.to_lowercase().contains("always") {
            self.cache
                .lock()
                .insert(cache_key(&entry.prompt, &entry.options), choice.to_string());
        }
        let _ = entry.emit.try_send(TurnEvent::new(
            "approval.resolved",
            json!({"request_id": request_id, "choice": choice}),
        ));
        let _ = entry.sender.send(choice.to_string());
        true
    }

    /// Resolve every pending approval to "deny" (session cancel/cleanup).
    pub fn cancel_all(&self) {
        let entries: Vec<_> = self.pending.lock().drain().collect();
        for (request_id, entry) in entries {
            let _ = entry.emit.try_send(TurnEvent::new(
                "approval.resolved",
                json!({"request_id": request_id, "choice": "deny"}),
            ));
            let _ = entry.sender.send("deny".to_string());
        }
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}
