//! Telegram front-end adapter.
//!
//! Long-polls `getUpdates`, parses commands and message turns (including
//! photo download), and delivers replies. Markdown delivery falls back to
//! plain text when Telegram rejects entity parsing, so a reply with odd
//! formatting still reaches the user instead of surfacing as an error.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tutorbot_core::error::ChannelError;
use tutorbot_core::frontend::{BotCommand, Frontend, InboundEvent, MessageRef};
use tutorbot_core::turn::{ImageData, TurnRequest, UserId};

const DEFAULT_BASE_URL: &str = "https://api.telegram.org";
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;
const POLL_RETRY_DELAY_SECS: u64 = 5;

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

/// Telegram front-end adapter.
#[derive(Clone)]
pub struct TelegramChannel {
    config: TelegramConfig,
    base_url: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(
                config.poll_timeout_secs + 30,
            ))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            config,
            base_url: DEFAULT_BASE_URL.into(),
            client,
        }
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.config.bot_token, method)
    }

    fn file_url(&self, file_path: &str) -> String {
        format!(
            "{}/file/bot{}/{}",
            self.base_url, self.config.bot_token, file_path
        )
    }

    async fn poll_loop(
        self,
        tx: mpsc::Sender<std::result::Result<InboundEvent, ChannelError>>,
    ) {
        let mut offset: i64 = 0;

        loop {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(POLL_RETRY_DELAY_SECS))
                        .await;
                    continue;
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(message) = update.message else {
                    continue;
                };
                let Some(event) = self.to_event(message).await else {
                    continue;
                };
                if tx.send(event).await.is_err() {
                    return; // Receiver dropped, stop polling
                }
            }
        }
    }

    async fn get_updates(&self, offset: i64) -> std::result::Result<Vec<Update>, ChannelError> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", self.config.poll_timeout_secs.to_string()),
                ("allowed_updates", r#"["message"]"#.to_string()),
            ])
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

        let body: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        if !body.ok {
            return Err(ChannelError::ConnectionLost(
                body.description.unwrap_or_else(|| "getUpdates not ok".into()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }

    /// Map one Telegram message to an inbound event. Unrecognized commands
    /// and content-free messages are dropped.
    async fn to_event(
        &self,
        message: TgMessage,
    ) -> Option<std::result::Result<InboundEvent, ChannelError>> {
        let user_id = UserId(message.from.as_ref()?.id.to_string());
        let chat_id = message.chat.id.to_string();

        if let Some(text) = message.text.as_deref() {
            if text.starts_with('/') {
                let command = parse_command(text)?;
                return Some(Ok(InboundEvent::Command {
                    user_id,
                    chat_id,
                    command,
                }));
            }
        }

        let image = match largest_photo(&message.photo) {
            Some(photo) => match self.download_photo(&photo.file_id).await {
                Ok(image) => Some(image),
                Err(e) => return Some(Err(e)),
            },
            None => None,
        };

        let text = message.text.or(message.caption).filter(|t| !t.is_empty());
        if text.is_none() && image.is_none() {
            return None;
        }

        Some(Ok(InboundEvent::Turn(TurnRequest {
            user_id,
            chat_id,
            text,
            image,
        })))
    }

    async fn download_photo(&self, file_id: &str) -> std::result::Result<ImageData, ChannelError> {
        let response = self
            .client
            .get(self.api_url("getFile"))
            .query(&[("file_id", file_id)])
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;

        let body: ApiResponse<TgFile> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        let file_path = body
            .result
            .and_then(|f| f.file_path)
            .ok_or_else(|| ChannelError::InvalidPayload("getFile returned no path".into()))?;

        let bytes = self
            .client
            .get(self.file_url(&file_path))
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?
            .bytes()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?;

        debug!(file_id = %file_id, bytes = bytes.len(), "Downloaded photo");

        // Telegram photos are re-encoded as JPEG server-side
        Ok(ImageData {
            mime_type: "image/jpeg".into(),
            data: bytes.to_vec(),
        })
    }

    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        markdown: bool,
    ) -> std::result::Result<ApiResponse<TgMessageId>, ChannelError> {
        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if markdown {
            body["parse_mode"] = serde_json::json!("Markdown");
        }

        self.client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))
    }
}

#[async_trait]
impl Frontend for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(
        &self,
    ) -> std::result::Result<
        mpsc::Receiver<std::result::Result<InboundEvent, ChannelError>>,
        ChannelError,
    > {
        if self.config.bot_token.is_empty() {
            return Err(ChannelError::NotConfigured("Telegram bot token".into()));
        }

        info!("Telegram channel starting (long polling)");
        let (tx, rx) = mpsc::channel(64);
        let poller = self.clone();
        tokio::spawn(poller.poll_loop(tx));
        Ok(rx)
    }

    async fn send(
        &self,
        chat_id: &str,
        text: &str,
    ) -> std::result::Result<MessageRef, ChannelError> {
        let response = self.send_message(chat_id, text, true).await?;

        let response = if is_entity_parse_error(&response) {
            // Markdown the platform cannot render; deliver the same text
            // unformatted instead of failing the turn.
            debug!(chat_id = %chat_id, "Entity parse rejected, retrying without markup");
            self.send_message(chat_id, text, false).await?
        } else {
            response
        };

        match response.result {
            Some(msg) if response.ok => Ok(MessageRef(msg.message_id.to_string())),
            _ => Err(ChannelError::DeliveryFailed(
                response
                    .description
                    .unwrap_or_else(|| "sendMessage not ok".into()),
            )),
        }
    }

    async fn delete(
        &self,
        chat_id: &str,
        message: &MessageRef,
    ) -> std::result::Result<(), ChannelError> {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message.0.parse::<i64>().unwrap_or_default(),
        });

        let response: ApiResponse<bool> = self
            .client
            .post(self.api_url("deleteMessage"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::DeliveryFailed(e.to_string()))?
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;

        if response.ok {
            return Ok(());
        }
        if is_message_not_found(response.description.as_deref()) {
            return Err(ChannelError::MessageNotFound);
        }
        Err(ChannelError::DeliveryFailed(
            response
                .description
                .unwrap_or_else(|| "deleteMessage not ok".into()),
        ))
    }
}

/// Recognize the bot's commands; `/reset` is an alias for `/clear`.
fn parse_command(text: &str) -> Option<BotCommand> {
    let command = text.split_whitespace().next()?;
    // Strip the "@botname" suffix used in group chats
    let command = command.split('@').next()?;
    match command {
        "/start" => Some(BotCommand::Start),
        "/clear" | "/reset" => Some(BotCommand::Clear),
        "/help" => Some(BotCommand::Help),
        _ => None,
    }
}

/// Telegram sends photo sizes in ascending resolution; take the largest.
fn largest_photo(photos: &[TgPhotoSize]) -> Option<&TgPhotoSize> {
    photos.iter().max_by_key(|p| p.file_size.unwrap_or(0))
}

fn is_entity_parse_error<T>(response: &ApiResponse<T>) -> bool {
    !response.ok
        && response
            .description
            .as_deref()
            .is_some_and(|d| d.contains("can't parse entities"))
}

fn is_message_not_found(description: Option<&str>) -> bool {
    description.is_some_and(|d| d.contains("message to delete not found"))
}

// --- Wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    #[serde(default)]
    from: Option<TgUser>,
    chat: TgChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    caption: Option<String>,
    #[serde(default)]
    photo: Vec<TgPhotoSize>,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgPhotoSize {
    file_id: String,
    #[serde(default)]
    file_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TgFile {
    #[serde(default)]
    file_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessageId {
    message_id: i64,
}
