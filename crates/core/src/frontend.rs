//! Frontend trait — the abstraction over messaging platforms.
//!
//! A Frontend connects tutorbot to a chat platform. It yields inbound
//! events (commands and message turns) and delivers outbound text,
//! including the ephemeral status message created and best-effort deleted
//! per turn.

use crate::error::ChannelError;
use crate::turn::TurnRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Reference to a delivered message, used for later deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef(pub String);

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The bot commands the front end recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// `/start` — welcome text, lazily touches conversation state.
    Start,
    /// `/clear` — reset conversation state.
    Clear,
    /// `/help` — usage text.
    Help,
}

/// One inbound event from the platform.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// A recognized command.
    Command {
        user_id: crate::turn::UserId,
        chat_id: String,
        command: BotCommand,
    },
    /// A message turn (text and/or image) for the orchestrator.
    Turn(TurnRequest),
}

/// The core Frontend trait.
///
/// Implementations handle platform-specific connection logic, message
/// formatting, and command parsing.
#[async_trait]
pub trait Frontend: Send + Sync {
    /// Human-readable front end name (e.g., "telegram").
    fn name(&self) -> &str;

    /// Start listening for inbound events.
    ///
    /// Returns a receiver that yields events. The implementation handles
    /// polling or webhooks internally.
    async fn start(
        &self,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<InboundEvent, ChannelError>>,
        ChannelError,
    >;

    /// Deliver a text message to a chat. Returns a reference usable for
    /// deletion.
    async fn send(
        &self,
        chat_id: &str,
        text: &str,
    ) -> std::result::Result<MessageRef, ChannelError>;

    /// Delete a previously delivered message.
    ///
    /// Returns `ChannelError::MessageNotFound` when the message is already
    /// gone, so callers can discriminate that case from real failures.
    async fn delete(
        &self,
        chat_id: &str,
        message: &MessageRef,
    ) -> std::result::Result<(), ChannelError>;

    /// Stop the front end gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}
