use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("slack request failed: {0}")]
    Request(String),
    #[error("slack api returned an error: {0}")]
    Api(String),
}

/// The bot's own identity, as reported by `auth.test`. Needed at startup so
/// mentions of the bot can be recognized in message text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: String,
    pub team: String,
}

/// Outbound Slack surface. Everything the agent needs to talk back:
/// posting (optionally into a thread) and resolving the human-friendly
/// names skills are configured with into ids.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// The bot's own identity.
    async fn identity(&self) -> Result<BotIdentity, ClientError>;

    /// Posts a message and returns its ts.
    async fn post_message(
        &self,
        channel: &str,
        text: &str,
        thread_ts: Option<&str>,
    ) -> Result<String, ClientError>;

    /// Opens (or reuses) a DM with a user and returns the channel id.
    async fn open_dm(&self, user_id: &str) -> Result<String, ClientError>;

    /// Finds a user id by username or real name, case-insensitive.
    async fn resolve_user(&self, name: &str) -> Result<Option<String>, ClientError>;

    /// Finds a channel id by bare name (no `#` prefix).
    async fn resolve_channel(&self, name: &str) -> Result<Option<String>, ClientError>;

    /// Looks up the human-readable name of a channel id.
    async fn channel_name(&self, channel_id: &str) -> Result<Option<String>, ClientError>;
}

/// Stand-in client for tests and dry runs. Posts go nowhere and every
/// lookup misses.
#[derive(Default)]
pub struct NoopChatClient;

#[async_trait]
impl ChatClient for NoopChatClient {
    async fn identity(&self) -> Result<BotIdentity, ClientError> {
        Ok(BotIdentity { user_id: "U0SKIPPER".to_string(), team: "noop".to_string() })
    }

    async fn post_message(
        &self,
        _channel: &str,
        _text: &str,
        _thread_ts: Option<&str>,
    ) -> Result<String, ClientError> {
        Ok("0000000000.000000".to_string())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, ClientError> {
        Ok(format!("D-{user_id}"))
    }

    async fn resolve_user(&self, _name: &str) -> Result<Option<String>, ClientError> {
        Ok(None)
    }

    async fn resolve_channel(&self, _name: &str) -> Result<Option<String>, ClientError> {
        Ok(None)
    }

    async fn channel_name(&self, _channel_id: &str) -> Result<Option<String>, ClientError> {
        Ok(None)
    }
}
