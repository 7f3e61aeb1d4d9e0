use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ProviderKind;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle phase of a skill conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Active,
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Complete => "complete",
        }
    }
}

/// Role of a transcript message. System messages carry the prompt and are
/// excluded from transcripts shown to providers as history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// Mutable per-conversation state blob. Known fields are typed; anything a
/// skill stores beyond them survives persistence round trips via `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub phase: Phase,
    #[serde(default)]
    pub turn: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self { phase: Phase::Active, turn: 0, extra: Map::new() }
    }
}

impl ConversationState {
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Slack thread timestamp anchoring the conversation. Scheduled skills
    /// start with a placeholder until the opening message posts.
    pub slack_thread: String,
    pub channel_id: String,
    pub user_id: String,
    /// `None` for free-form chats with no skill attached.
    pub skill_name: Option<String>,
    pub state: ConversationState,
    pub llm_provider: ProviderKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn start(
        slack_thread: impl Into<String>,
        channel_id: impl Into<String>,
        user_id: impl Into<String>,
        skill_name: Option<String>,
        llm_provider: ProviderKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::generate(),
            slack_thread: slack_thread.into(),
            channel_id: channel_id.into(),
            user_id: user_id.into(),
            skill_name,
            state: ConversationState::default(),
            llm_provider,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoredMessage {
    pub conversation_id: ConversationId,
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}
