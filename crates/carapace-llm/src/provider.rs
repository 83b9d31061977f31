//! LLM provider trait and configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmResult;

/// A message in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role.
    pub role: MessageRole,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User message.
    User,
    /// Assistant message.
    Assistant,
}

/// LLM provider trait.
///
/// Carapace only needs whole completions; the security pipeline never
/// streams.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Get the model being used.
    fn model(&self) -> &str;

    /// Complete a conversation, returning the assistant's text.
    async fn complete(&self, messages: &[Message], system: &str) -> LlmResult<String>;

    /// Simple single-prompt completion.
    async fn complete_simple(&self, system: &str, prompt: &str) -> LlmResult<String> {
        let messages = vec![Message::user(prompt)];
        self.complete(&messages, system).await
    }
}

/// Blanket implementation so `Box<dyn LlmProvider>` can stand in wherever a
/// provider is required.
#[async_trait]
impl LlmProvider for Box<dyn LlmProvider> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn model(&self) -> &str {
        (**self).model()
    }

    async fn complete(&self, messages: &[Message], system: &str) -> LlmResult<String> {
        (**self).complete(messages, system).await
    }
}

/// Configuration for LLM providers.
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: usize,
    /// API base URL (for custom endpoints).
    pub base_url: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("has_api_key", &!self.api_key.is_empty())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("has_base_url", &self.base_url.is_some())
            .finish()
    }
}

impl ProviderConfig {
    /// Create a new config with API key and model.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 1024,
            base_url: None,
        }
    }

    /// Set max tokens.
    #[must_use]
    pub fn max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = max;
        self
    }

    /// Set base URL.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = ProviderConfig::new("sk-secret-12345", "claude-haiku");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-12345"));
        assert!(debug.contains("has_api_key: true"));
    }

    #[tokio::test]
    async fn test_boxed_provider() {
        struct Canned;

        #[async_trait]
        impl LlmProvider for Canned {
            fn name(&self) -> &str {
                "canned"
            }

            fn model(&self) -> &str {
                "canned-1"
            }

            async fn complete(&self, _messages: &[Message], _system: &str) -> LlmResult<String> {
                Ok("true".to_string())
            }
        }

        let boxed: Box<dyn LlmProvider> = Box::new(Canned);
        assert_eq!(boxed.name(), "canned");
        assert_eq!(boxed.complete_simple("", "x").await.unwrap(), "true");
    }
}
