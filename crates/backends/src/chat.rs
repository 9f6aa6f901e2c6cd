//! Chat-session decorator — the session-handle variant's producer.
//!
//! Wraps any stateless backend and holds the accumulated dialog itself,
//! keyed by an opaque handle it mints. Callers store and replay the handle
//! without ever inspecting it; the dialog never leaves this process.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use tutorbot_core::backend::{Backend, BackendReply, Payload, PromptPart, SessionHandle};
use tutorbot_core::error::BackendError;
use tutorbot_core::turn::TurnEntry;
use uuid::Uuid;

/// Dialog entries retained per handle, matching the rolling transcript.
const RETAINED_ENTRIES: usize = 20;

/// Turns a stateless backend into one that carries the dialog.
pub struct ChatSessionBackend {
    inner: Arc<dyn Backend>,
    instruction: String,
    dialogs: RwLock<HashMap<SessionHandle, Vec<TurnEntry>>>,
}

impl ChatSessionBackend {
    pub fn new(inner: Arc<dyn Backend>, instruction: impl Into<String>) -> Self {
        Self {
            inner,
            instruction: instruction.into(),
            dialogs: RwLock::new(HashMap::new()),
        }
    }

    fn compose(&self, history: &[TurnEntry], question: &str) -> String {
        let mut block = self.instruction.clone();
        if !history.is_empty() {
            block.push_str("\n\nRecent conversation:\n");
            for entry in history {
                block.push_str(entry.speaker.label());
                block.push_str(": ");
                block.push_str(&entry.text);
                block.push('\n');
            }
        }
        block.push_str("\n\nStudent question: ");
        block.push_str(question);
        block
    }
}

#[async_trait]
impl Backend for ChatSessionBackend {
    fn name(&self) -> &str {
        "chat-session"
    }

    async fn generate(&self, payload: Payload) -> Result<BackendReply, BackendError> {
        let handle = payload
            .session
            .clone()
            .unwrap_or_else(|| SessionHandle(Uuid::new_v4().to_string()));

        let history = self
            .dialogs
            .read()
            .await
            .get(&handle)
            .cloned()
            .unwrap_or_default();

        let question = payload.text_content();
        let composed = self.compose(&history, &question);

        let mut parts = vec![PromptPart::Text(composed)];
        parts.extend(payload.parts.into_iter().filter_map(|p| match p {
            PromptPart::Image(image) => Some(PromptPart::Image(image)),
            PromptPart::Text(_) => None,
        }));

        let reply = self
            .inner
            .generate(Payload {
                parts,
                session: None,
            })
            .await?;

        {
            let mut dialogs = self.dialogs.write().await;
            let dialog = dialogs.entry(handle.clone()).or_default();
            dialog.push(TurnEntry::student(&question));
            dialog.push(TurnEntry::assistant(&reply.text));
            while dialog.len() > RETAINED_ENTRIES {
                dialog.remove(0);
            }
            debug!(handle = %handle, len = dialog.len(), "Dialog extended");
        }

        Ok(BackendReply {
            text: reply.text,
            session: Some(handle),
        })
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        self.inner.health_check().await
    }
}
