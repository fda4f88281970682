/// LLM access layer, the single point of entry for all language-model calls.
///
/// Generators and scorers depend on `LlmBackend` only. The concrete provider
/// (Anthropic or OpenAI) is chosen from configuration at startup.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, LlmProvider};

pub mod anthropic;
pub mod openai;
pub mod prompts;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

const MAX_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Free text, or strict JSON (scorer and resume generator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Text,
    Json,
}

impl ResponseMode {
    pub fn temperature(self) -> f32 {
        match self {
            ResponseMode::Text => 0.7,
            ResponseMode::Json => 0.3,
        }
    }

    pub fn max_tokens(self) -> u32 {
        match self {
            ResponseMode::Text => 2000,
            ResponseMode::Json => 4000,
        }
    }
}

#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Sends an ordered, role-tagged conversation and returns the model's text.
    async fn send(&self, messages: &[LlmMessage], mode: ResponseMode) -> Result<String, LlmError>;
}

/// Builds the backend selected by `LLM_PROVIDER`.
pub fn build_backend(config: &Config) -> Arc<dyn LlmBackend> {
    match config.llm_provider {
        LlmProvider::Claude => Arc::new(AnthropicBackend::new(config.llm_api_key.clone())),
        LlmProvider::OpenAi => Arc::new(OpenAiBackend::new(config.llm_api_key.clone())),
    }
}

/// Sends in JSON mode and deserializes the reply.
pub async fn call_json<T: DeserializeOwned>(
    llm: &dyn LlmBackend,
    messages: &[LlmMessage],
) -> Result<T, LlmError> {
    let text = llm.send(messages, ResponseMode::Json).await?;
    let text = extract_json(strip_json_fences(&text));
    serde_json::from_str(text).map_err(LlmError::Parse)
}

pub(crate) fn http_client() -> Client {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Sends the request built by `build`, retrying 429 and 5xx with exponential backoff.
/// Both providers share this policy and the `{"error": {"message"}}` error shape.
pub(crate) async fn send_with_retry<F>(build: F) -> Result<Response, LlmError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s
            let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
            warn!(
                "LLM call attempt {} failed, retrying after {}ms...",
                attempt,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        let response = match build().send().await {
            Ok(r) => r,
            Err(e) => {
                last_error = Some(LlmError::Http(e));
                continue;
            }
        };

        let status = response.status();

        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            warn!("LLM API returned {}: {}", status, body);
            last_error = Some(LlmError::Api {
                status: status.as_u16(),
                message: body,
            });
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        return Ok(response);
    }

    Err(last_error.unwrap_or(LlmError::RateLimited {
        retries: MAX_RETRIES,
    }))
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

/// Cuts the first balanced JSON object/array out of surrounding prose.
/// Returns the input unchanged when none is found.
fn extract_json(text: &str) -> &str {
    let Some(start) = text.find(['{', '[']) else {
        return text;
    };
    let bytes = text.as_bytes();
    let (mut depth, mut in_str, mut escape) = (0usize, false, false);

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            match b {
                _ if escape => escape = false,
                b'\\' => escape = true,
                b'"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[start..=i];
                }
            }
            _ => {}
        }
    }
    text
}
