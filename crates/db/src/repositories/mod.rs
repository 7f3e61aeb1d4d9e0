use async_trait::async_trait;
use thiserror::Error;

use skipper_core::config::ProviderKind;
use skipper_core::conversation::{
    Conversation, ConversationId, ConversationState, MessageRole, StoredMessage,
};

pub mod conversations;
pub mod memory;

pub use conversations::SqlConversationStore;
pub use memory::InMemoryConversationStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Partial update applied to a conversation row. Unset fields are left
/// untouched; `updated_at` always advances.
#[derive(Clone, Debug, Default)]
pub struct ConversationUpdate {
    pub slack_thread: Option<String>,
    pub state: Option<ConversationState>,
    pub llm_provider: Option<ProviderKind>,
}

impl ConversationUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slack_thread(mut self, slack_thread: impl Into<String>) -> Self {
        self.slack_thread = Some(slack_thread.into());
        self
    }

    pub fn state(mut self, state: ConversationState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn llm_provider(mut self, provider: ProviderKind) -> Self {
        self.llm_provider = Some(provider);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.slack_thread.is_none() && self.state.is_none() && self.llm_provider.is_none()
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError>;

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Most recently updated conversation anchored at the given thread.
    async fn find_by_thread(
        &self,
        slack_thread: &str,
    ) -> Result<Option<Conversation>, RepositoryError>;

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
    ) -> Result<(), RepositoryError>;

    async fn append_message(
        &self,
        id: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepositoryError>;

    /// Full transcript in insertion order, system messages included.
    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, RepositoryError>;

    /// Skill-bound conversations in a channel that have not completed,
    /// most recently updated first.
    async fn list_active_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Conversation>, RepositoryError>;
}
