//! Claude (Anthropic) LLM provider implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::error::{LlmError, LlmResult};
use crate::provider::{LlmProvider, Message, MessageRole, ProviderConfig};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Claude LLM provider over the Messages API.
pub struct ClaudeProvider {
    client: Client,
    config: ProviderConfig,
}

impl ClaudeProvider {
    /// Create a new Claude provider.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Build the API request body.
    fn build_request(&self, messages: &[Message], system: &str) -> Value {
        let api_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        MessageRole::User => "user",
                        MessageRole::Assistant => "assistant",
                    },
                    "content": m.content,
                })
            })
            .collect();

        let mut request = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": api_messages,
        });

        if !system.is_empty() {
            request["system"] = Value::String(system.to_string());
        }

        request
    }
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "Anthropic Claude"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete(&self, messages: &[Message], system: &str) -> LlmResult<String> {
        if self.config.api_key.is_empty() {
            return Err(LlmError::ApiKeyNotConfigured {
                provider: "claude".to_string(),
            });
        }

        let request_body = self.build_request(messages, system);
        let url = self.config.base_url.as_deref().unwrap_or(ANTHROPIC_API_URL);

        debug!(model = self.config.model, "sending Claude request");

        let mut api_key_header = reqwest::header::HeaderValue::try_from(&self.config.api_key)
            .map_err(|e| LlmError::ConfigError(format!("invalid API key characters: {e}")))?;
        api_key_header.set_sensitive(true);

        let response = self
            .client
            .post(url)
            .header("x-api-key", api_key_header)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Claude API error");

            if status.as_u16() == 429 {
                return Err(LlmError::RateLimitExceeded {
                    retry_after_secs: 60,
                });
            }

            return Err(LlmError::ApiRequestFailed(format!(
                "status {status}: {body}"
            )));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let mut text = String::new();
        for block in &api_response.content {
            if let ContentBlock::Text { text: t } = block {
                text.push_str(t);
            }
        }
        Ok(text)
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}
