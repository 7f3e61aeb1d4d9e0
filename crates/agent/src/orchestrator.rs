//! Top-level message dispatch. Classifies each inbound event and hands it
//! to the conversation runtime, the skill creator, or free-form chat.

use std::sync::Arc;

use tracing::{info, warn};

use skipper_core::conversation::ConversationId;
use skipper_core::errors::AgentError;
use skipper_core::event::InboundEvent;
use skipper_core::skill::{SkillConfig, Trigger};
use skipper_db::{ConversationStore, ConversationUpdate};

use crate::classifier::{Classifier, Intent};
use crate::creator::SkillCreator;
use crate::llm::ChatMessage;
use crate::prompts::general_system_prompt;
use crate::router::ProviderRouter;
use crate::runtime::ConversationRuntime;
use crate::scheduler::SkillScheduler;
use crate::SharedRegistry;

/// Placeholder thread for scheduler-initiated conversations. The posting
/// layer patches in the real message ts via [`AgentCore::bind_thread`].
pub const PENDING_THREAD: &str = "pending";

pub struct AgentCore {
    store: Arc<dyn ConversationStore>,
    registry: SharedRegistry,
    classifier: Classifier,
    runtime: Arc<ConversationRuntime>,
    creator: SkillCreator,
    router: Arc<ProviderRouter>,
    scheduler: Option<Arc<SkillScheduler>>,
}

impl AgentCore {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: SharedRegistry,
        runtime: Arc<ConversationRuntime>,
        router: Arc<ProviderRouter>,
        bot_user_id: impl Into<String>,
        scheduler: Option<Arc<SkillScheduler>>,
    ) -> Self {
        let creator = SkillCreator::new(router.clone(), registry.clone());
        Self {
            store,
            registry,
            classifier: Classifier::new(bot_user_id),
            runtime,
            creator,
            router,
            scheduler,
        }
    }

    /// Handles one inbound Slack message. `Ok(None)` means nothing to say.
    pub async fn handle_message(
        &self,
        event: &InboundEvent,
    ) -> Result<Option<String>, AgentError> {
        let intent = {
            let registry = self.registry.read().await;
            self.classifier
                .classify(event, self.store.as_ref(), &registry)
                .await
                .map_err(|error| AgentError::Persistence(error.to_string()))?
        };
        info!(channel = %event.channel, intent = intent.label(), "message classified");

        match intent {
            Intent::Continuation { conversation, text } => {
                self.runtime.continue_conversation(&conversation.id, &text).await
            }
            Intent::SkillModification { text } => self.handle_modification(&text).await,
            Intent::Command { text } => self.handle_command(&text).await,
            Intent::Mention { skills, stripped_text } => {
                self.handle_mention(event, skills, &stripped_text).await
            }
            Intent::Ambient { conversation, text } => {
                self.runtime.continue_conversation(&conversation.id, &text).await
            }
            Intent::General { text } => self.handle_general(&text).await.map(Some),
        }
    }

    /// Starts a skill from the scheduler with a placeholder thread.
    /// Returns the opening reply and the conversation id so the posting
    /// layer can bind the real thread once the message lands.
    pub async fn trigger_scheduled_skill(
        &self,
        skill: &SkillConfig,
        channel: &str,
        user: &str,
    ) -> Result<(String, ConversationId), AgentError> {
        self.runtime.start_skill(skill, channel, user, PENDING_THREAD).await
    }

    /// Replaces a placeholder thread with the posted message's ts so
    /// replies in that thread classify as continuations.
    pub async fn bind_thread(
        &self,
        id: &ConversationId,
        slack_thread: &str,
    ) -> Result<(), AgentError> {
        self.store
            .update(id, ConversationUpdate::new().slack_thread(slack_thread))
            .await
            .map_err(|error| AgentError::Persistence(error.to_string()))
    }

    async fn handle_command(&self, text: &str) -> Result<Option<String>, AgentError> {
        let skill = match self.creator.create_from_description(text).await {
            Ok(skill) => skill,
            Err(error) => {
                warn!(%error, "skill creation failed");
                return Ok(Some(
                    "I wasn't able to create that skill. Could you rephrase what you'd like?"
                        .to_string(),
                ));
            }
        };

        self.register_schedule(&skill).await;

        let schedule_info = match skill.schedule.as_deref() {
            Some(schedule) => format!(" | Schedule: `{schedule}` (active now)"),
            None => String::new(),
        };
        Ok(Some(format!(
            "Got it! I've created a new skill: *{}*\n_{}_\nTrigger: `{}`{}\nYou can modify this by telling me what to change.",
            skill.name,
            skill.description,
            skill.trigger.as_str(),
            schedule_info,
        )))
    }

    async fn handle_modification(&self, text: &str) -> Result<Option<String>, AgentError> {
        let target = {
            let registry = self.registry.read().await;
            registry.resolve_name(text).map(|skill| skill.name.clone())
        };

        let Some(name) = target else {
            let names = {
                let registry = self.registry.read().await;
                let mut names: Vec<String> =
                    registry.all().map(|skill| format!("`{}`", skill.name)).collect();
                names.sort();
                names
            };
            return Ok(Some(format!(
                "Which skill would you like to modify? Active skills: {}",
                names.join(", ")
            )));
        };

        match self.creator.modify_skill(&name, text).await {
            Ok(updated) => {
                self.register_schedule(&updated).await;
                Ok(Some(format!("Updated skill *{}*. Changes saved.", updated.name)))
            }
            Err(error) => {
                warn!(skill = %name, %error, "skill modification failed");
                Ok(Some(format!(
                    "I had trouble updating *{name}*. Could you try rephrasing?"
                )))
            }
        }
    }

    async fn handle_mention(
        &self,
        event: &InboundEvent,
        skills: Vec<SkillConfig>,
        _stripped_text: &str,
    ) -> Result<Option<String>, AgentError> {
        // The first bound skill wins; the registry orders them by name.
        let Some(skill) = skills.first() else {
            return Ok(None);
        };
        let thread = event
            .thread_ts
            .clone()
            .or_else(|| event.ts.clone())
            .unwrap_or_default();
        let (reply, _) = self
            .runtime
            .start_skill(skill, &event.channel, &event.user, &thread)
            .await?;
        Ok(Some(reply))
    }

    async fn handle_general(&self, text: &str) -> Result<String, AgentError> {
        let system_prompt = general_system_prompt(self.runtime.has_services());
        let history = vec![ChatMessage::user(text)];
        let (reply, _) = self
            .router
            .complete(None, Some(&system_prompt), &history)
            .await
            .map_err(|error| AgentError::Provider(error.to_string()))?;
        Ok(self.runtime.process_actions(reply).await)
    }

    async fn register_schedule(&self, skill: &SkillConfig) {
        if skill.trigger != Trigger::Scheduled {
            return;
        }
        if let Some(scheduler) = &self.scheduler {
            scheduler.add_or_update_job(skill).await;
        }
    }
}

impl Intent {
    fn label(&self) -> &'static str {
        match self {
            Intent::Continuation { .. } => "continuation",
            Intent::SkillModification { .. } => "skill_modification",
            Intent::Command { .. } => "command",
            Intent::Mention { .. } => "mention",
            Intent::Ambient { .. } => "ambient",
            Intent::General { .. } => "general",
        }
    }
}
