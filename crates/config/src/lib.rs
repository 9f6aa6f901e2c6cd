//! Configuration loading and validation for tutorbot.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides for the two secrets. Validates all settings at startup.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Environment override for the Telegram bot token.
pub const ENV_TELEGRAM_TOKEN: &str = "TUTORBOT_TELEGRAM_TOKEN";
/// Environment override for the Gemini API key.
pub const ENV_GEMINI_KEY: &str = "TUTORBOT_GEMINI_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// The root configuration structure.
#[derive(Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telegram: TelegramSection,

    #[serde(default)]
    pub backend: BackendSection,

    #[serde(default)]
    pub relay: RelaySection,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("telegram", &self.telegram)
            .field("backend", &self.backend)
            .field("relay", &self.relay)
            .finish()
    }
}

#[derive(Clone, Default, Deserialize)]
pub struct TelegramSection {
    /// Bot token from @BotFather.
    #[serde(default)]
    pub bot_token: String,

    /// Long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSection")
            .field("bot_token", &redact(&self.bot_token))
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct BackendSection {
    /// Gemini API key.
    #[serde(default)]
    pub api_key: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// How conversational context is carried between turns.
    #[serde(default)]
    pub mode: ConversationMode,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            mode: ConversationMode::default(),
        }
    }
}

impl std::fmt::Debug for BackendSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendSection")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("mode", &self.mode)
            .finish()
    }
}

/// The conversation-state deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationMode {
    /// Client-side rolling transcript supplied with every prompt.
    #[default]
    Transcript,
    /// Backend-held chat session referenced by an opaque handle.
    Chat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Admitted requests per user per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,

    /// Trailing rate window in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,

    /// Transcript entries retained per user.
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,

    /// Transcript entries supplied to prompt assembly.
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Per-fragment delivery size; Telegram's hard limit is 4096.
    #[serde(default = "default_max_fragment_len")]
    pub max_fragment_len: usize,

    /// The instruction preamble for every prompt.
    #[serde(default = "default_instruction")]
    pub instruction: String,
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            history_cap: default_history_cap(),
            history_window: default_history_window(),
            max_fragment_len: default_max_fragment_len(),
            instruction: default_instruction(),
        }
    }
}

fn default_poll_timeout() -> u64 {
    30
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_max_requests() -> usize {
    10
}
fn default_window_seconds() -> i64 {
    60
}
fn default_history_cap() -> usize {
    20
}
fn default_history_window() -> usize {
    10
}
fn default_max_fragment_len() -> usize {
    4000
}
fn default_instruction() -> String {
    "You are a helpful AI study tutor. Explain concepts clearly and concisely, break complex \
topics into understandable parts, and guide students to understand rather than just handing \
over answers. Keep responses under 3000 characters when possible for readability."
        .into()
}

fn redact(s: &str) -> &'static str {
    if s.is_empty() { "\"\"" } else { "[REDACTED]" }
}

impl AppConfig {
    /// Load from a TOML file (missing file means all defaults), then apply
    /// environment overrides for the secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            debug!(path = %path.display(), "Loading config file");
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var(ENV_TELEGRAM_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Ok(key) = std::env::var(ENV_GEMINI_KEY) {
            self.backend.api_key = key;
        }
    }

    /// Check the configuration is usable before wiring anything up.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.bot_token.is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("telegram.bot_token is required (or set {ENV_TELEGRAM_TOKEN})"),
            });
        }
        if self.backend.api_key.is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("backend.api_key is required (or set {ENV_GEMINI_KEY})"),
            });
        }
        if self.relay.max_requests == 0 {
            return Err(ConfigError::Invalid {
                message: "relay.max_requests must be at least 1".into(),
            });
        }
        if self.relay.max_fragment_len == 0 || self.relay.max_fragment_len > 4096 {
            return Err(ConfigError::Invalid {
                message: "relay.max_fragment_len must be between 1 and 4096".into(),
            });
        }
        if self.relay.history_window > self.relay.history_cap {
            return Err(ConfigError::Invalid {
                message: "relay.history_window cannot exceed relay.history_cap".into(),
            });
        }
        Ok(())
    }
}
