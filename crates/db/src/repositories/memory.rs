use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use skipper_core::conversation::{Conversation, ConversationId, MessageRole, StoredMessage};

use super::{ConversationStore, ConversationUpdate, RepositoryError};

/// Map-backed store for tests and wiring that does not need persistence.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<Vec<StoredMessage>>,
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.id.0.clone(), conversation);
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(&id.0).cloned())
    }

    async fn find_by_thread(
        &self,
        slack_thread: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations
            .values()
            .filter(|conversation| conversation.slack_thread == slack_thread)
            .max_by_key(|conversation| conversation.updated_at)
            .cloned())
    }

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
    ) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        if let Some(conversation) = conversations.get_mut(&id.0) {
            if let Some(slack_thread) = update.slack_thread {
                conversation.slack_thread = slack_thread;
            }
            if let Some(state) = update.state {
                conversation.state = state;
            }
            if let Some(provider) = update.llm_provider {
                conversation.llm_provider = provider;
            }
            conversation.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(StoredMessage {
            conversation_id: id.clone(),
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .filter(|message| &message.conversation_id == id)
            .cloned()
            .collect())
    }

    async fn list_active_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        let mut matched: Vec<_> = conversations
            .values()
            .filter(|conversation| {
                conversation.channel_id == channel_id
                    && conversation.skill_name.is_some()
                    && !conversation.state.is_complete()
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(matched)
    }
}
