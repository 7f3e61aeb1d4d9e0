use std::sync::Arc;

use tracing::{info, warn};

use skipper_core::config::ProviderKind;
use skipper_core::conversation::MessageRole;
use skipper_core::skill::SkillConfig;

use crate::llm::{ChatMessage, LlmBackend, ProviderError};

/// Picks a backend per request and executes the call with fallback.
///
/// Policy: a process-wide override beats everything; otherwise a skill's
/// conversation escalates to cloud once its user-turn count exceeds the
/// escalation threshold, and defaults to the skill's preferred backend below
/// it. With no skill in play the local backend is used.
pub struct ProviderRouter {
    local: Arc<dyn LlmBackend>,
    cloud: Arc<dyn LlmBackend>,
    global_override: Option<ProviderKind>,
}

impl ProviderRouter {
    pub fn new(
        local: Arc<dyn LlmBackend>,
        cloud: Arc<dyn LlmBackend>,
        global_override: Option<ProviderKind>,
    ) -> Self {
        Self { local, cloud, global_override }
    }

    pub fn select(&self, skill: Option<&SkillConfig>, user_turns: u32) -> ProviderKind {
        if let Some(forced) = self.global_override {
            return forced;
        }

        match skill {
            Some(skill) if user_turns > skill.escalation_threshold => ProviderKind::Cloud,
            Some(skill) => skill.llm.unwrap_or(ProviderKind::Local),
            None => ProviderKind::Local,
        }
    }

    /// Runs a completion and reports which backend actually produced it.
    pub async fn complete(
        &self,
        skill: Option<&SkillConfig>,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<(String, ProviderKind), ProviderError> {
        let user_turns = history
            .iter()
            .filter(|message| message.role == MessageRole::User)
            .count() as u32;

        let selected = self.select(skill, user_turns);
        if selected == ProviderKind::Cloud {
            info!(user_turns, "routing to cloud backend");
        }
        self.complete_with(selected, system_prompt, history).await
    }

    /// Runs a completion against a specific backend, bypassing selection.
    /// Local calls still fall back to cloud on unavailability or error.
    pub async fn complete_with(
        &self,
        provider: ProviderKind,
        system_prompt: Option<&str>,
        history: &[ChatMessage],
    ) -> Result<(String, ProviderKind), ProviderError> {
        match provider {
            ProviderKind::Cloud => {
                let text = self.cloud.complete(system_prompt, history).await?;
                Ok((text, ProviderKind::Cloud))
            }
            ProviderKind::Local => {
                if !self.local.is_available().await {
                    warn!("local backend unavailable, falling back to cloud");
                    let text = self.cloud.complete(system_prompt, history).await?;
                    return Ok((text, ProviderKind::Cloud));
                }

                match self.local.complete(system_prompt, history).await {
                    Ok(text) => Ok((text, ProviderKind::Local)),
                    Err(error) => {
                        warn!(error = %error, "local backend failed, falling back to cloud");
                        let text = self.cloud.complete(system_prompt, history).await?;
                        Ok((text, ProviderKind::Cloud))
                    }
                }
            }
        }
    }
}
