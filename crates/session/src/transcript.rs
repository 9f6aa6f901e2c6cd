//! Rolling-transcript conversation store.
//!
//! Keeps the last N entries per user (default 20, i.e. 10 exchanges) and
//! evicts the oldest first once the cap is exceeded.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use tracing::debug;
use tutorbot_core::backend::BackendReply;
use tutorbot_core::session::{ConversationContext, ConversationStore};
use tutorbot_core::turn::{TurnEntry, UserId};

/// Default retention cap in entries (two per exchange).
pub const DEFAULT_RETAINED_ENTRIES: usize = 20;

/// An in-memory transcript store keyed by user identity.
pub struct TranscriptStore {
    entries: RwLock<HashMap<UserId, VecDeque<TurnEntry>>>,
    cap: usize,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_RETAINED_ENTRIES)
    }

    /// Create a store with a custom retention cap.
    pub fn with_cap(cap: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            cap,
        }
    }

    /// Number of users with state (for diagnostics).
    pub async fn user_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for TranscriptStore {
    fn name(&self) -> &str {
        "transcript"
    }

    async fn get_or_create(&self, user: &UserId) -> ConversationContext {
        let mut entries = self.entries.write().await;
        let transcript = entries.entry(user.clone()).or_default();
        ConversationContext::History(transcript.iter().cloned().collect())
    }

    async fn record_turn(&self, user: &UserId, student_text: &str, reply: &BackendReply) {
        let mut entries = self.entries.write().await;
        let transcript = entries.entry(user.clone()).or_default();
        transcript.push_back(TurnEntry::student(student_text));
        transcript.push_back(TurnEntry::assistant(&reply.text));
        while transcript.len() > self.cap {
            transcript.pop_front();
        }
        debug!(user = %user, len = transcript.len(), "Recorded turn");
    }

    async fn reset(&self, user: &UserId) {
        self.entries.write().await.remove(user);
        debug!(user = %user, "Transcript reset");
    }

    async fn recent_window(&self, user: &UserId, k: usize) -> Vec<TurnEntry> {
        let entries = self.entries.read().await;
        let Some(transcript) = entries.get(user) else {
            return Vec::new();
        };
        let skip = transcript.len().saturating_sub(k);
        transcript.iter().skip(skip).cloned().collect()
    }
}
