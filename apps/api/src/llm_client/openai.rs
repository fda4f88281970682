//! OpenAI Chat Completions backend.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{http_client, send_with_retry, LlmBackend, LlmError, LlmMessage, ResponseMode};

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const MODEL: &str = "gpt-4o";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [LlmMessage],
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
}

impl OpenAiBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http_client(),
            api_key,
        }
    }
}

fn build_request(messages: &[LlmMessage], mode: ResponseMode) -> ChatRequest<'_> {
    ChatRequest {
        model: MODEL,
        messages,
        temperature: mode.temperature(),
        max_tokens: mode.max_tokens(),
        response_format: (mode == ResponseMode::Json).then(|| json!({"type": "json_object"})),
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, messages: &[LlmMessage], mode: ResponseMode) -> Result<String, LlmError> {
        let request_body = build_request(messages, mode);

        let response = send_with_retry(|| {
            self.client
                .post(OPENAI_API_URL)
                .bearer_auth(&self.api_key)
                .json(&request_body)
        })
        .await?;

        let body: ChatResponse = response.json().await?;
        if let Some(usage) = &body.usage {
            debug!(
                "OpenAI call succeeded: prompt_tokens={}, completion_tokens={}",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}
