//! Anthropic Messages API backend.
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts::JSON_ONLY_INSTRUCTION;
use super::{http_client, send_with_retry, LlmBackend, LlmError, LlmMessage, ResponseMode, Role};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const MODEL: &str = "claude-sonnet-4-5";

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Clone)]
pub struct AnthropicBackend {
    client: Client,
    api_key: String,
}

impl AnthropicBackend {
    pub fn new(api_key: String) -> Self {
        Self {
            client: http_client(),
            api_key,
        }
    }
}

/// System turns are lifted into the top-level `system` field; the API only accepts
/// user/assistant turns in `messages`.
fn build_request(messages: &[LlmMessage], mode: ResponseMode) -> AnthropicRequest<'_> {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let mut turns: Vec<AnthropicMessage<'_>> = messages
        .iter()
        .filter_map(|m| match m.role {
            Role::System => None,
            Role::User => Some(AnthropicMessage {
                role: "user",
                content: &m.content,
            }),
            Role::Assistant => Some(AnthropicMessage {
                role: "assistant",
                content: &m.content,
            }),
        })
        .collect();

    if mode == ResponseMode::Json {
        turns.push(AnthropicMessage {
            role: "user",
            content: JSON_ONLY_INSTRUCTION,
        });
    }

    AnthropicRequest {
        model: MODEL,
        max_tokens: mode.max_tokens(),
        temperature: mode.temperature(),
        system: (!system.is_empty()).then(|| system.join("\n\n")),
        messages: turns,
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn provider_name(&self) -> &'static str {
        "claude"
    }

    async fn send(&self, messages: &[LlmMessage], mode: ResponseMode) -> Result<String, LlmError> {
        let request_body = build_request(messages, mode);

        let response = send_with_retry(|| {
            self.client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(&request_body)
        })
        .await?;

        let body: AnthropicResponse = response.json().await?;
        debug!(
            "Claude call succeeded: input_tokens={}, output_tokens={}",
            body.usage.input_tokens, body.usage.output_tokens
        );

        body.content
            .into_iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or(LlmError::EmptyContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_messages_are_lifted() {
        let messages = vec![
            LlmMessage::system("You are an HR analyst."),
            LlmMessage::user("Score this."),
        ];
        let request = build_request(&messages, ResponseMode::Text);

        assert_eq!(request.system.as_deref(), Some("You are an HR analyst."));
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
        assert_eq!(request.max_tokens, 2000);
    }

    #[test]
    fn test_json_mode_appends_instruction_turn() {
        let messages = vec![LlmMessage::user("Score this.")];
        let request = build_request(&messages, ResponseMode::Json);

        assert!(request.system.is_none());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[1].content, JSON_ONLY_INSTRUCTION);
        assert_eq!(request.temperature, 0.3);
    }
}
