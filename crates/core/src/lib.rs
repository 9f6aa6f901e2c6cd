//! # Tutorbot Core
//!
//! Domain types, traits, and error definitions for the tutorbot
//! conversational relay. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the turn cycle is defined as a trait here: the
//! generative backend, the messaging front end, and the conversation store.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod error;
pub mod frontend;
pub mod session;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, BackendReply, Payload, PromptPart, SessionHandle};
pub use error::{BackendError, ChannelError, Error, Result};
pub use frontend::{BotCommand, Frontend, InboundEvent, MessageRef};
pub use session::{ConversationContext, ConversationStore};
pub use turn::{ImageData, Speaker, TurnEntry, TurnRequest, UserId};
