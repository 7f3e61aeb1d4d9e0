use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use skipper_core::config::ProviderKind;
use skipper_core::conversation::{
    Conversation, ConversationId, ConversationState, MessageRole, StoredMessage,
};

use super::{ConversationStore, ConversationUpdate, RepositoryError};
use crate::DbPool;

pub struct SqlConversationStore {
    pool: DbPool,
}

impl SqlConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const CONVERSATION_COLUMNS: &str = "id,
                slack_thread,
                channel_id,
                user_id,
                skill_name,
                state,
                llm_provider,
                created_at,
                updated_at";

#[async_trait::async_trait]
impl ConversationStore for SqlConversationStore {
    async fn create(&self, conversation: Conversation) -> Result<(), RepositoryError> {
        let state_json = encode_state(&conversation.state)?;

        sqlx::query(
            "INSERT INTO conversations (
                id,
                slack_thread,
                channel_id,
                user_id,
                skill_name,
                state,
                llm_provider,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&conversation.id.0)
        .bind(&conversation.slack_thread)
        .bind(&conversation.channel_id)
        .bind(&conversation.user_id)
        .bind(conversation.skill_name.as_deref())
        .bind(state_json)
        .bind(conversation.llm_provider.as_str())
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &ConversationId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE id = ?",
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn find_by_thread(
        &self,
        slack_thread: &str,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE slack_thread = ?
             ORDER BY updated_at DESC
             LIMIT 1",
        ))
        .bind(slack_thread)
        .fetch_optional(&self.pool)
        .await?;

        row.map(conversation_from_row).transpose()
    }

    async fn update(
        &self,
        id: &ConversationId,
        update: ConversationUpdate,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let state_json = update.state.as_ref().map(encode_state).transpose()?;

        sqlx::query(
            "UPDATE conversations SET
                slack_thread = COALESCE(?, slack_thread),
                state = COALESCE(?, state),
                llm_provider = COALESCE(?, llm_provider),
                updated_at = ?
             WHERE id = ?",
        )
        .bind(update.slack_thread.as_deref())
        .bind(state_json)
        .bind(update.llm_provider.map(|provider| provider.as_str()))
        .bind(now)
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (conversation_id, role, content, timestamp)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(role.as_str())
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn messages(&self, id: &ConversationId) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT conversation_id, role, content, timestamp
             FROM messages
             WHERE conversation_id = ?
             ORDER BY id ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }

    async fn list_active_for_channel(
        &self,
        channel_id: &str,
    ) -> Result<Vec<Conversation>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS}
             FROM conversations
             WHERE channel_id = ? AND skill_name IS NOT NULL
             ORDER BY updated_at DESC",
        ))
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;

        let conversations: Result<Vec<_>, _> =
            rows.into_iter().map(conversation_from_row).collect();
        Ok(conversations?
            .into_iter()
            .filter(|conversation| !conversation.state.is_complete())
            .collect())
    }
}

fn encode_state(state: &ConversationState) -> Result<String, RepositoryError> {
    serde_json::to_string(state)
        .map_err(|error| RepositoryError::Decode(format!("could not encode state: {error}")))
}

fn conversation_from_row(row: SqliteRow) -> Result<Conversation, RepositoryError> {
    let state_raw: String = row.get("state");
    let state: ConversationState = serde_json::from_str(&state_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid state blob: {error}")))?;

    let provider_raw: String = row.get("llm_provider");
    let llm_provider = ProviderKind::parse(&provider_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown llm provider `{provider_raw}`"))
    })?;

    Ok(Conversation {
        id: ConversationId(row.get("id")),
        slack_thread: row.get("slack_thread"),
        channel_id: row.get("channel_id"),
        user_id: row.get("user_id"),
        skill_name: row.get("skill_name"),
        state,
        llm_provider,
        created_at: parse_timestamp(row.get("created_at"), "created_at")?,
        updated_at: parse_timestamp(row.get("updated_at"), "updated_at")?,
    })
}

fn message_from_row(row: SqliteRow) -> Result<StoredMessage, RepositoryError> {
    let role_raw: String = row.get("role");
    let role = MessageRole::parse(&role_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message role `{role_raw}`")))?;

    Ok(StoredMessage {
        conversation_id: ConversationId(row.get("conversation_id")),
        role,
        content: row.get("content"),
        timestamp: parse_timestamp(row.get("timestamp"), "timestamp")?,
    })
}

fn parse_timestamp(value: String, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use skipper_core::config::ProviderKind;
    use skipper_core::conversation::{Conversation, ConversationState, MessageRole, Phase};

    use super::SqlConversationStore;
    use crate::repositories::{ConversationStore, ConversationUpdate};
    use crate::{connect_with_settings, migrations};

    async fn store() -> SqlConversationStore {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect");
        migrations::run_pending(&pool).await.expect("run migrations");
        SqlConversationStore::new(pool)
    }

    fn skill_conversation(thread: &str, channel: &str, skill: &str) -> Conversation {
        Conversation::start(thread, channel, "U1", Some(skill.to_string()), ProviderKind::Local)
    }

    #[tokio::test]
    async fn create_and_find_round_trip() {
        let store = store().await;
        let conversation = skill_conversation("171.0001", "C1", "standup");
        let id = conversation.id.clone();

        store.create(conversation.clone()).await.expect("create");

        let by_id = store.find_by_id(&id).await.expect("find").expect("present");
        assert_eq!(by_id.skill_name.as_deref(), Some("standup"));
        assert_eq!(by_id.llm_provider, ProviderKind::Local);
        assert_eq!(by_id.state.turn, 0);

        let by_thread =
            store.find_by_thread("171.0001").await.expect("find").expect("present");
        assert_eq!(by_thread.id, id);
    }

    #[tokio::test]
    async fn update_patches_fields_and_bumps_updated_at() {
        let store = store().await;
        let conversation = skill_conversation("171.0002", "C1", "standup");
        let id = conversation.id.clone();
        let created_updated_at = conversation.updated_at;
        store.create(conversation).await.expect("create");

        let mut state = ConversationState::default();
        state.turn = 3;
        store
            .update(
                &id,
                ConversationUpdate::new().state(state).llm_provider(ProviderKind::Cloud),
            )
            .await
            .expect("update");

        let loaded = store.find_by_id(&id).await.expect("find").expect("present");
        assert_eq!(loaded.state.turn, 3);
        assert_eq!(loaded.llm_provider, ProviderKind::Cloud);
        assert_eq!(loaded.slack_thread, "171.0002");
        assert!(loaded.updated_at >= created_updated_at);
    }

    #[tokio::test]
    async fn thread_placeholder_can_be_patched_later() {
        let store = store().await;
        let conversation = skill_conversation("pending", "C1", "standup");
        let id = conversation.id.clone();
        store.create(conversation).await.expect("create");

        store
            .update(&id, ConversationUpdate::new().slack_thread("171.0099"))
            .await
            .expect("update");

        let loaded = store.find_by_thread("171.0099").await.expect("find").expect("present");
        assert_eq!(loaded.id, id);
        assert!(store.find_by_thread("pending").await.expect("find").is_none());
    }

    #[tokio::test]
    async fn state_blob_preserves_nested_unknown_fields() {
        let store = store().await;
        let mut conversation = skill_conversation("171.0003", "C1", "standup");
        conversation.state.extra.insert(
            "session".to_string(),
            json!({"week": 12, "answers": ["shipped", null]}),
        );
        let id = conversation.id.clone();
        store.create(conversation.clone()).await.expect("create");

        let loaded = store.find_by_id(&id).await.expect("find").expect("present");
        assert_eq!(loaded.state, conversation.state);
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = store().await;
        let conversation = skill_conversation("171.0004", "C1", "standup");
        let id = conversation.id.clone();
        store.create(conversation).await.expect("create");

        store.append_message(&id, MessageRole::System, "prompt").await.expect("append");
        store.append_message(&id, MessageRole::User, "hello").await.expect("append");
        store.append_message(&id, MessageRole::Assistant, "hi there").await.expect("append");

        let messages = store.messages(&id).await.expect("messages");
        let roles: Vec<_> = messages.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::System, MessageRole::User, MessageRole::Assistant]
        );
        assert_eq!(messages[1].content, "hello");
    }

    #[tokio::test]
    async fn list_active_excludes_completed_and_unbound() {
        let store = store().await;

        let active = skill_conversation("171.0005", "C1", "standup");
        let active_id = active.id.clone();
        store.create(active).await.expect("create");

        let mut finished = skill_conversation("171.0006", "C1", "retro");
        finished.state.phase = Phase::Complete;
        store.create(finished).await.expect("create");

        let freeform =
            Conversation::start("171.0007", "C1", "U1", None, ProviderKind::Local);
        store.create(freeform).await.expect("create");

        let elsewhere = skill_conversation("171.0008", "C2", "standup");
        store.create(elsewhere).await.expect("create");

        let listed = store.list_active_for_channel("C1").await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, active_id);
    }

    #[tokio::test]
    async fn list_active_orders_by_recent_update() {
        let store = store().await;

        let older = skill_conversation("171.0009", "C1", "standup");
        let newer = skill_conversation("171.0010", "C1", "retro");
        let newer_id = newer.id.clone();
        store.create(older).await.expect("create");
        store.create(newer.clone()).await.expect("create");

        let mut state = ConversationState::default();
        state.turn = 1;
        store.update(&newer_id, ConversationUpdate::new().state(state)).await.expect("update");

        let listed = store.list_active_for_channel("C1").await.expect("list");
        assert_eq!(listed.first().map(|c| c.id.clone()), Some(newer_id));
    }
}
