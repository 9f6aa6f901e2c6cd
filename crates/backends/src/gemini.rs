//! Gemini native backend implementation.
//!
//! Uses the hosted Generative Language `generateContent` endpoint.
//!
//! Features:
//! - API-key query-parameter authentication
//! - Multimodal requests with `inlineData` parts (image after text)
//! - Safety blocks surfaced as `BackendError::ContentBlocked`, from either
//!   `promptFeedback.blockReason` or a candidate `finishReason` of SAFETY

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use tutorbot_core::backend::{Backend, BackendReply, Payload, PromptPart};
use tutorbot_core::error::BackendError;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Gemini `generateContent` backend.
///
/// Stateless: the payload's session handle, if any, is ignored — wrap this
/// in `ChatSessionBackend` for the session-handle deployment mode.
pub struct GeminiBackend {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.into(),
            client,
        }
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn to_api_request(payload: &Payload) -> GenerateRequest {
        let parts = payload
            .parts
            .iter()
            .map(|part| match part {
                PromptPart::Text(text) => Part {
                    text: Some(text.clone()),
                    inline_data: None,
                },
                PromptPart::Image(image) => Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: image.mime_type.clone(),
                        data: BASE64.encode(&image.data),
                    }),
                },
            })
            .collect();

        GenerateRequest {
            contents: vec![Content {
                role: Some("user".into()),
                parts,
            }],
        }
    }

    /// Map a parsed API response to a reply or a classified failure.
    fn reply_from_response(resp: GenerateResponse) -> Result<BackendReply, BackendError> {
        if let Some(feedback) = resp.prompt_feedback {
            if let Some(reason) = feedback.block_reason {
                return Err(BackendError::ContentBlocked { reason });
            }
        }

        let Some(candidate) = resp.candidates.into_iter().next() else {
            return Err(BackendError::MalformedResponse(
                "Response contained no candidates".into(),
            ));
        };

        if candidate.finish_reason.as_deref() == Some("SAFETY") {
            return Err(BackendError::ContentBlocked {
                reason: "SAFETY".into(),
            });
        }

        let text = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(BackendError::MalformedResponse(
                "Candidate contained no text".into(),
            ));
        }

        Ok(BackendReply {
            text,
            session: None,
        })
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, payload: Payload) -> Result<BackendReply, BackendError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = Self::to_api_request(&payload);

        debug!(backend = "gemini", model = %self.model, parts = payload.parts.len(), "Sending generate request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(e.to_string())
                } else {
                    BackendError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(BackendError::RateLimited { retry_after_secs: 5 });
        }
        if status == 401 || status == 403 {
            return Err(BackendError::AuthenticationFailed(
                "Invalid Gemini API key".into(),
            ));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini API error");
            return Err(BackendError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_resp: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::MalformedResponse(e.to_string()))?;

        Self::reply_from_response(api_resp)
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        Ok(!self.api_key.is_empty())
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        rename = "inlineData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}
