//! Generative backend implementations for tutorbot.
//!
//! - [`GeminiBackend`] — stateless `generateContent` client for the hosted
//!   Gemini API, with multimodal payloads and safety-block classification.
//! - [`ChatSessionBackend`] — a decorator that turns any stateless backend
//!   into the session-handle variant by holding the dialog itself.

mod chat;
mod gemini;

pub use chat::ChatSessionBackend;
pub use gemini::GeminiBackend;
