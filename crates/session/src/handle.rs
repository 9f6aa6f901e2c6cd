//! Session-handle conversation store.
//!
//! For backends that hold the dialog themselves. The store only keeps the
//! opaque continuation token per user; it never inspects its contents.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use tutorbot_core::backend::{BackendReply, SessionHandle};
use tutorbot_core::session::{ConversationContext, ConversationStore};
use tutorbot_core::turn::{TurnEntry, UserId};

/// An in-memory map from user identity to session handle.
pub struct HandleStore {
    handles: RwLock<HashMap<UserId, SessionHandle>>,
}

impl HandleStore {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for HandleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for HandleStore {
    fn name(&self) -> &str {
        "session-handle"
    }

    async fn get_or_create(&self, user: &UserId) -> ConversationContext {
        ConversationContext::Session(self.handles.read().await.get(user).cloned())
    }

    async fn record_turn(&self, user: &UserId, _student_text: &str, reply: &BackendReply) {
        // The backend carries the dialog; we only track the latest handle.
        if let Some(handle) = &reply.session {
            debug!(user = %user, handle = %handle, "Session handle updated");
            self.handles
                .write()
                .await
                .insert(user.clone(), handle.clone());
        }
    }

    async fn reset(&self, user: &UserId) {
        self.handles.write().await.remove(user);
        debug!(user = %user, "Session handle discarded");
    }

    async fn recent_window(&self, _user: &UserId, _k: usize) -> Vec<TurnEntry> {
        // The dialog lives behind the handle; there is no local transcript.
        Vec::new()
    }
}
