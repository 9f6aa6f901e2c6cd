//! ConversationStore trait — per-user conversational state.
//!
//! Two implementations share this contract: a rolling transcript of
//! bounded length, and an opaque session-handle map for backends that hold
//! the dialog themselves. The prompt assembler and orchestrator are
//! written once against this abstraction.
//!
//! All state is in-memory and process-scoped; a restart loses history.
//! That is accepted data-loss policy, not a defect.

use crate::backend::{BackendReply, SessionHandle};
use crate::turn::{TurnEntry, UserId};
use async_trait::async_trait;

/// What a store can contribute to prompt assembly.
#[derive(Debug, Clone)]
pub enum ConversationContext {
    /// Recent transcript entries, oldest first.
    History(Vec<TurnEntry>),
    /// The backend-held continuation token, if one exists yet.
    Session(Option<SessionHandle>),
}

impl ConversationContext {
    /// Whether there is no accumulated context at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::History(entries) => entries.is_empty(),
            Self::Session(handle) => handle.is_none(),
        }
    }
}

/// Owner of per-user conversational state.
///
/// Exactly one conversation exists per user at a time. State is mutated by
/// appending exactly one Student and one Assistant entry per successful
/// turn (transcript) or by replacing the handle (session), and destroyed
/// on explicit reset. None of these operations can fail.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// A human-readable name for this store variant.
    fn name(&self) -> &str;

    /// Existing state for the user, or freshly created empty state.
    async fn get_or_create(&self, user: &UserId) -> ConversationContext;

    /// Record one completed turn. Called only after backend success, so a
    /// failed turn never leaves a partial write.
    async fn record_turn(&self, user: &UserId, student_text: &str, reply: &BackendReply);

    /// Remove all state for the user. Idempotent.
    async fn reset(&self, user: &UserId);

    /// The last `k` transcript entries in chronological order. Empty for
    /// users with no state and for the session-handle variant.
    async fn recent_window(&self, user: &UserId, k: usize) -> Vec<TurnEntry>;
}
