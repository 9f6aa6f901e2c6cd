//! Backend trait — the abstraction over generative-language services.
//!
//! A Backend accepts one assembled payload and returns generated text or a
//! classified failure. It is the sole suspension point of a turn; the
//! orchestrator calls `generate()` without knowing which service sits
//! behind it.
//!
//! Implementations: Gemini `generateContent`, a chat-session decorator,
//! and test mocks.

use crate::error::BackendError;
use crate::turn::ImageData;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// An opaque continuation token for a backend-held dialog.
///
/// The core never inspects its contents — it only stores, reuses, and
/// discards it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionHandle(pub String);

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One part of a multimodal prompt.
///
/// Ordering matters: an image part must follow the text part it belongs
/// to, because the backend associates trailing non-text parts with the
/// preceding instruction.
#[derive(Debug, Clone)]
pub enum PromptPart {
    Text(String),
    Image(ImageData),
}

/// The assembled request for one backend call.
#[derive(Debug, Clone)]
pub struct Payload {
    /// Ordered prompt parts; the first is always text.
    pub parts: Vec<PromptPart>,
    /// Continuation token for backends that hold the dialog themselves.
    /// `None` for stateless (transcript-mode) calls.
    pub session: Option<SessionHandle>,
}

impl Payload {
    /// A single-text-part payload with no session.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![PromptPart::Text(text.into())],
            session: None,
        }
    }

    /// The concatenated text parts (used for logging and by wrappers).
    pub fn text_content(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PromptPart::Text(t) => Some(t.as_str()),
                PromptPart::Image(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A successful backend response.
#[derive(Debug, Clone)]
pub struct BackendReply {
    /// The generated text.
    pub text: String,
    /// Updated continuation token, if the backend holds the dialog.
    pub session: Option<SessionHandle>,
}

impl BackendReply {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            session: None,
        }
    }
}

/// The core Backend trait.
///
/// Every generative service implements this. No retries, timeouts, or
/// cancellation are imposed at this seam — a call runs to completion or
/// classified failure.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend (e.g., "gemini").
    fn name(&self) -> &str;

    /// Send one assembled payload and get the generated reply.
    async fn generate(&self, payload: Payload) -> std::result::Result<BackendReply, BackendError>;

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, BackendError> {
        Ok(true)
    }
}
