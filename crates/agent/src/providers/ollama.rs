use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::{ChatMessage, LlmBackend, ProviderError};

/// Local inference backend speaking the Ollama chat API.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|error| ProviderError::Request(error.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError> {
        let url = format!("{}/api/chat", self.base_url);

        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(OllamaMessage { role: "system", content: prompt });
        }
        for message in history {
            messages.push(OllamaMessage { role: message.role.as_str(), content: &message.content });
        }

        debug!(url = %url, model = %self.model, messages = messages.len(), "calling ollama");

        let request = OllamaChatRequest { model: &self.model, messages, stream: false };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|error| ProviderError::Request(error.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(ProviderError::Api { status: status.as_u16(), body });
        }

        let parsed: OllamaChatResponse = serde_json::from_str(&body)
            .map_err(|error| ProviderError::Parse(error.to_string()))?;

        Ok(parsed.message.content)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(2)).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                debug!(error = %error, "ollama liveness probe failed");
                false
            }
        }
    }
}
