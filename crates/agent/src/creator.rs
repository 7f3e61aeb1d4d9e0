use std::sync::Arc;

use tracing::{error, info};

use skipper_core::config::ProviderKind;
use skipper_core::errors::AgentError;
use skipper_core::skill::SkillConfig;

use crate::llm::ChatMessage;
use crate::prompts::SKILL_CREATION_PROMPT;
use crate::router::ProviderRouter;
use crate::SharedRegistry;

/// Synthesizes and edits skill definitions from natural language.
///
/// Generation always runs on the cloud backend; the local models are not
/// reliable enough at emitting valid YAML.
pub struct SkillCreator {
    router: Arc<ProviderRouter>,
    registry: SharedRegistry,
}

impl SkillCreator {
    pub fn new(router: Arc<ProviderRouter>, registry: SharedRegistry) -> Self {
        Self { router, registry }
    }

    pub async fn create_from_description(
        &self,
        description: &str,
    ) -> Result<SkillConfig, AgentError> {
        let history = vec![ChatMessage::user(description)];
        let (response, _) = self
            .router
            .complete_with(ProviderKind::Cloud, Some(SKILL_CREATION_PROMPT), &history)
            .await
            .map_err(|err| AgentError::Provider(err.to_string()))?;

        let skill = parse_generated_yaml(&response)?;
        self.save(skill).await
    }

    pub async fn modify_skill(
        &self,
        skill_name: &str,
        modification: &str,
    ) -> Result<SkillConfig, AgentError> {
        let current = {
            let registry = self.registry.read().await;
            registry
                .get(skill_name)
                .cloned()
                .ok_or_else(|| AgentError::SkillNotFound(skill_name.to_string()))?
        };

        let current_yaml = serde_yaml::to_string(&current)
            .map_err(|err| AgentError::InvalidSkill(err.to_string()))?;
        let prompt = format!(
            "Here is the current skill configuration:\n\n{current_yaml}\n\n\
             Modify it according to this request: {modification}\n\n\
             Respond with ONLY the complete updated YAML."
        );

        let history = vec![ChatMessage::user(prompt)];
        let (response, _) = self
            .router
            .complete_with(ProviderKind::Cloud, Some(SKILL_CREATION_PROMPT), &history)
            .await
            .map_err(|err| AgentError::Provider(err.to_string()))?;

        let skill = parse_generated_yaml(&response)?;
        self.save(skill).await
    }

    async fn save(&self, skill: SkillConfig) -> Result<SkillConfig, AgentError> {
        let mut registry = self.registry.write().await;
        registry
            .save_skill(skill.clone())
            .map_err(|err| AgentError::InvalidSkill(err.to_string()))?;
        info!(skill = %skill.name, "skill definition saved");
        Ok(skill)
    }
}

/// Parses model output into a skill, tolerating markdown fences the model
/// was told not to emit but sometimes does anyway.
fn parse_generated_yaml(response: &str) -> Result<SkillConfig, AgentError> {
    let trimmed = response.trim();
    let body = strip_fences(trimmed);

    let skill: SkillConfig = serde_yaml::from_str(body).map_err(|err| {
        error!(error = %err, "generated skill yaml did not parse");
        AgentError::InvalidSkill(format!("generated YAML did not parse: {err}"))
    })?;

    if skill.name.trim().is_empty() {
        return Err(AgentError::InvalidSkill("generated skill has no name".to_string()));
    }

    skill.validate().map_err(AgentError::InvalidSkill)?;
    Ok(skill)
}

fn strip_fences(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    let without_open = match text.find('\n') {
        Some(index) => &text[index + 1..],
        None => return text,
    };
    match without_open.rfind("```") {
        Some(index) => without_open[..index].trim_end(),
        None => without_open,
    }
}
