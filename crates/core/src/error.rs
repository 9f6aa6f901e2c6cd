//! Error types for the tutorbot domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all tutorbot operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Backend errors ---
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    // --- Channel errors ---
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Turn validation ---
    #[error("Empty turn: neither text nor image present")]
    EmptyTurn,

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the generative backend collaborator.
///
/// The orchestrator converts every one of these into exactly one
/// user-facing message; raw error text never reaches the user.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Content blocked by safety filter: {reason}")]
    ContentBlocked { reason: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Malformed backend response: {0}")]
    MalformedResponse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl BackendError {
    /// Whether this failure is a safety/policy block on the input,
    /// as opposed to a transient delivery failure.
    pub fn is_content_blocked(&self) -> bool {
        matches!(self, Self::ContentBlocked { .. })
    }
}

/// Failures raised by the messaging front end.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Message not found")]
    MessageNotFound,

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid channel payload: {0}")]
    InvalidPayload(String),
}
