use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use skipper_core::conversation::MessageRole;

use crate::llm::{ChatMessage, LlmBackend, ProviderError};

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 2048;

/// Cloud backend speaking the Anthropic messages API.
pub struct ClaudeBackend {
    client: Client,
    api_base: String,
    api_key: Option<SecretString>,
    model: String,
}

impl ClaudeBackend {
    pub fn new(
        api_key: Option<SecretString>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Self::with_api_base(ANTHROPIC_API_BASE, api_key, model, timeout_secs)
    }

    pub fn with_api_base(
        api_base: &str,
        api_key: Option<SecretString>,
        model: &str,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| ProviderError::Request(error.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(flatten)]
    _rest: Value,
}

#[async_trait]
impl LlmBackend for ClaudeBackend {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_ref().ok_or(ProviderError::NotConfigured)?;
        let url = format!("{}/messages", self.api_base);

        // The messages API rejects system-role entries; anything system-like
        // in the history folds into the system parameter instead.
        let messages: Vec<AnthropicMessage<'_>> = history
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .map(|message| AnthropicMessage {
                role: match message.role {
                    MessageRole::Assistant => "assistant",
                    _ => "user",
                },
                content: &message.content,
            })
            .collect();

        debug!(url = %url, model = %self.model, messages = messages.len(), "calling anthropic");

        let request = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: system_prompt,
            messages,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|error| ProviderError::Request(error.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Api { status: status.as_u16(), body });
        }

        let parsed: AnthropicResponse = serde_json::from_str(&body)
            .map_err(|error| ProviderError::Parse(error.to_string()))?;

        let text: Vec<&str> = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if text.is_empty() {
            return Err(ProviderError::Parse("response contained no text blocks".to_string()));
        }

        Ok(text.join("\n"))
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
