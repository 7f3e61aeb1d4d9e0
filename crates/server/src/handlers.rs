use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info, warn};

use skipper_agent::output::OutputError;
use skipper_agent::{AgentCore, SkillTrigger, TranscriptPoster};
use skipper_core::event::InboundEvent;
use skipper_core::skill::SkillConfig;
use skipper_slack::{ChatClient, EventSink};

const FALLBACK_REPLY: &str = "Something went wrong on my end. I'll look into it.";

/// Wires inbound socket events to the agent and posts replies into the
/// originating thread.
pub struct AgentEventSink {
    agent: Arc<AgentCore>,
    client: Arc<dyn ChatClient>,
}

impl AgentEventSink {
    pub fn new(agent: Arc<AgentCore>, client: Arc<dyn ChatClient>) -> Self {
        Self { agent, client }
    }
}

#[async_trait]
impl EventSink for AgentEventSink {
    async fn on_message(&self, event: InboundEvent) -> anyhow::Result<()> {
        let mut event = event;
        if event.channel_name.is_none() {
            // Best effort; mention skills can be bound by channel name.
            if let Ok(Some(name)) = self.client.channel_name(&event.channel).await {
                event = event.with_channel_name(name);
            }
        }

        let reply = match self.agent.handle_message(&event).await {
            Ok(reply) => reply,
            Err(agent_error) => {
                error!(channel = %event.channel, error = %agent_error, "message handling failed");
                Some(FALLBACK_REPLY.to_string())
            }
        };

        let Some(reply) = reply else {
            return Ok(());
        };
        let thread_ts = event.thread_ts.as_deref().or(event.ts.as_deref());
        self.client
            .post_message(&event.channel, &reply, thread_ts)
            .await
            .map_err(|post_error| anyhow::anyhow!("reply post failed: {post_error}"))?;
        Ok(())
    }
}

/// Scheduler callback: resolves where a scheduled skill should run, starts
/// it, posts the opening message, and patches the placeholder thread with
/// the posted ts. Every failure is logged and dropped so a bad skill never
/// takes the scheduler down.
pub struct ScheduledSkillTrigger {
    agent: Arc<AgentCore>,
    client: Arc<dyn ChatClient>,
}

impl ScheduledSkillTrigger {
    pub fn new(agent: Arc<AgentCore>, client: Arc<dyn ChatClient>) -> Self {
        Self { agent, client }
    }

    async fn resolve_destination(
        &self,
        skill: &SkillConfig,
    ) -> Option<(String, String)> {
        let channel_ref = skill.channel.as_deref().unwrap_or("dm");

        if channel_ref == "dm" {
            let Some(target_user) = skill.target_user.as_deref() else {
                error!(skill = %skill.name, "dm skill has no target_user");
                return None;
            };
            let user_id = match self.client.resolve_user(target_user).await {
                Ok(Some(user_id)) => user_id,
                Ok(None) => {
                    error!(skill = %skill.name, target_user, "could not find user");
                    return None;
                }
                Err(client_error) => {
                    error!(skill = %skill.name, error = %client_error, "user lookup failed");
                    return None;
                }
            };
            match self.client.open_dm(&user_id).await {
                Ok(channel_id) => Some((channel_id, user_id)),
                Err(client_error) => {
                    error!(skill = %skill.name, error = %client_error, "could not open dm");
                    None
                }
            }
        } else {
            let channel_name = channel_ref.trim_start_matches('#');
            match self.client.resolve_channel(channel_name).await {
                Ok(Some(channel_id)) => Some((channel_id, "system".to_string())),
                Ok(None) => {
                    error!(skill = %skill.name, channel = channel_name, "could not find channel");
                    None
                }
                Err(client_error) => {
                    error!(skill = %skill.name, error = %client_error, "channel lookup failed");
                    None
                }
            }
        }
    }
}

#[async_trait]
impl SkillTrigger for ScheduledSkillTrigger {
    async fn fire(&self, skill: SkillConfig) {
        let Some((channel_id, user_id)) = self.resolve_destination(&skill).await else {
            return;
        };

        let (reply, conversation_id) = match self
            .agent
            .trigger_scheduled_skill(&skill, &channel_id, &user_id)
            .await
        {
            Ok(started) => started,
            Err(agent_error) => {
                error!(skill = %skill.name, error = %agent_error, "scheduled skill failed to start");
                return;
            }
        };

        let ts = match self.client.post_message(&channel_id, &reply, None).await {
            Ok(ts) => ts,
            Err(client_error) => {
                error!(skill = %skill.name, error = %client_error, "could not post scheduled opener");
                return;
            }
        };

        if let Err(agent_error) = self.agent.bind_thread(&conversation_id, &ts).await {
            warn!(skill = %skill.name, error = %agent_error, "could not bind thread to conversation");
        }
        info!(skill = %skill.name, channel = %channel_id, "scheduled skill started");
    }
}

/// Adapts the chat client to the transcript output seam so completed
/// sessions can be posted back to a channel.
pub struct ChannelPoster {
    client: Arc<dyn ChatClient>,
}

impl ChannelPoster {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TranscriptPoster for ChannelPoster {
    async fn post(&self, channel: &str, text: &str) -> Result<(), OutputError> {
        // Channel may be a configured name rather than an id.
        let name = channel.trim_start_matches('#');
        let channel_id = match self.client.resolve_channel(name).await {
            Ok(Some(id)) => id,
            Ok(None) => channel.to_string(),
            Err(client_error) => return Err(OutputError::Post(client_error.to_string())),
        };
        self.client
            .post_message(&channel_id, text, None)
            .await
            .map(|_| ())
            .map_err(|client_error| OutputError::Post(client_error.to_string()))
    }
}
