//! Turn and conversation domain types.
//!
//! These are the core value objects that flow through one orchestration
//! cycle: the front end hands over a `TurnRequest`, the conversation store
//! supplies `TurnEntry` history, and the backend's reply flows back out as
//! size-bounded fragments.

use serde::{Deserialize, Serialize};

/// Opaque, stable user identifier supplied by the front end.
///
/// The sole key for all per-user state. The core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The end user
    Student,
    /// The bot
    Assistant,
}

impl Speaker {
    /// The label used when rendering history into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Student => "Student",
            Speaker::Assistant => "Tutor",
        }
    }
}

/// One entry in a user's rolling transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    pub speaker: Speaker,
    pub text: String,
}

impl TurnEntry {
    pub fn student(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Student,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }
}

/// Raw image bytes handed over by the front end.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    /// MIME type, e.g. "image/jpeg".
    pub mime_type: String,
    /// The raw bytes.
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// The ephemeral input to one orchestration cycle.
///
/// At least one of `text` / `image` must be present; an image-only turn
/// gets a default question substituted during prompt assembly.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub user_id: UserId,
    /// The chat to deliver replies into (platform-specific).
    pub chat_id: String,
    pub text: Option<String>,
    pub image: Option<ImageData>,
}

impl TurnRequest {
    /// A plain text turn.
    pub fn text(user_id: UserId, chat_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id: chat_id.into(),
            text: Some(text.into()),
            image: None,
        }
    }

    /// Whether the turn carries any content at all.
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().is_none_or(str::is_empty) && self.image.is_none()
    }
}
