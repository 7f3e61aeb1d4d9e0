use async_trait::async_trait;
use thiserror::Error;

use skipper_core::conversation::MessageRole;

/// A single entry in the model-facing history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),
    #[error("provider returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("could not parse provider response: {0}")]
    Parse(String),
    #[error("cloud provider is not configured (missing api key)")]
    NotConfigured,
}

/// A response-generating backend. The system prompt travels separately from
/// the history because backends differ in where it goes on the wire.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<String, ProviderError>;

    /// Cheap liveness probe; used to decide whether to bother calling
    /// `complete` on the local backend at all.
    async fn is_available(&self) -> bool;
}
