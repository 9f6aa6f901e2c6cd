//! Conversation state stores for tutorbot.
//!
//! Two implementations of `ConversationStore`:
//! - [`TranscriptStore`] — a rolling Student/Tutor transcript of bounded
//!   length, supplying history for prompt assembly.
//! - [`HandleStore`] — an opaque session-handle map for backends that hold
//!   the dialog themselves.

mod handle;
mod transcript;

pub use handle::HandleStore;
pub use transcript::TranscriptStore;
