use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use skipper_core::config::ProviderKind;
use skipper_core::conversation::{
    Conversation, ConversationId, ConversationState, MessageRole, Phase,
};
use skipper_core::errors::AgentError;
use skipper_core::skill::{SkillConfig, DEFAULT_MAX_TURNS};
use skipper_db::repositories::{ConversationUpdate, RepositoryError};
use skipper_db::ConversationStore;

use crate::llm::{ChatMessage, ProviderError};
use crate::output::OutputSink;
use crate::router::ProviderRouter;
use crate::services::{format_email_results, format_file_results, WorkspaceServices};
use crate::SharedRegistry;

const BEGIN_TURN: &str = "Begin the conversation.";
const ACTION_PATTERN: &str = r"\[\[ACTION:(\w+)([^\]]*)\]\]";
const UNREAD_FETCH_LIMIT: usize = 5;

/// Drives a skill conversation from start to completion.
///
/// Conversations are a one-way state machine: active until the turn count
/// reaches the skill's max_turns, then complete. Completion hands the full
/// transcript to the output sink exactly once.
pub struct ConversationRuntime {
    store: Arc<dyn ConversationStore>,
    registry: SharedRegistry,
    router: Arc<ProviderRouter>,
    services: Option<Arc<dyn WorkspaceServices>>,
    output: Option<Arc<dyn OutputSink>>,
    action_directive: Option<Regex>,
}

impl ConversationRuntime {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        registry: SharedRegistry,
        router: Arc<ProviderRouter>,
        services: Option<Arc<dyn WorkspaceServices>>,
        output: Option<Arc<dyn OutputSink>>,
    ) -> Self {
        Self {
            store,
            registry,
            router,
            services,
            output,
            action_directive: Regex::new(ACTION_PATTERN).ok(),
        }
    }

    pub fn has_services(&self) -> bool {
        self.services.is_some()
    }

    /// Opens a new conversation for a skill: builds the system prompt,
    /// asks the provider for the opening message, and persists the system
    /// and assistant messages with `turn = 1`.
    pub async fn start_skill(
        &self,
        skill: &SkillConfig,
        channel: &str,
        user: &str,
        thread: &str,
    ) -> Result<(String, ConversationId), AgentError> {
        let mut system_prompt = build_system_prompt(skill);
        let service_context = self.service_context(skill).await;
        system_prompt.push_str(&service_context);

        let conversation = Conversation::start(
            thread,
            channel,
            user,
            Some(skill.name.clone()),
            skill.llm.unwrap_or(ProviderKind::Local),
        );
        let id = conversation.id.clone();
        self.store.create(conversation).await.map_err(store_err)?;

        let history = vec![ChatMessage::user(BEGIN_TURN)];
        let (reply, provider_used) = self
            .router
            .complete(Some(skill), Some(&system_prompt), &history)
            .await
            .map_err(provider_err)?;
        let reply = self.process_actions(reply).await;

        self.store
            .append_message(&id, MessageRole::System, &system_prompt)
            .await
            .map_err(store_err)?;
        self.store.append_message(&id, MessageRole::Assistant, &reply).await.map_err(store_err)?;

        let state = ConversationState { turn: 1, ..ConversationState::default() };
        self.store
            .update(&id, ConversationUpdate::new().state(state).llm_provider(provider_used))
            .await
            .map_err(store_err)?;

        Ok((reply, id))
    }

    /// Advances a conversation by one turn. Returns `None` when the id is
    /// unknown. A conversation that already completed still advances; the
    /// terminal phase is never re-entered from here, it just stays complete.
    pub async fn continue_conversation(
        &self,
        id: &ConversationId,
        user_text: &str,
    ) -> Result<Option<String>, AgentError> {
        let Some(conversation) = self.store.find_by_id(id).await.map_err(store_err)? else {
            return Ok(None);
        };

        self.store.append_message(id, MessageRole::User, user_text).await.map_err(store_err)?;

        let stored = self.store.messages(id).await.map_err(store_err)?;
        let system_prompt = stored
            .iter()
            .find(|message| message.role == MessageRole::System)
            .map(|message| message.content.clone());
        let history: Vec<ChatMessage> = stored
            .iter()
            .filter(|message| message.role != MessageRole::System)
            .map(|message| ChatMessage { role: message.role, content: message.content.clone() })
            .collect();

        let skill = {
            let registry = self.registry.read().await;
            conversation.skill_name.as_deref().and_then(|name| registry.get(name)).cloned()
        };

        let (reply, provider_used) = self
            .router
            .complete(skill.as_ref(), system_prompt.as_deref(), &history)
            .await
            .map_err(provider_err)?;
        let reply = self.process_actions(reply).await;

        self.store.append_message(id, MessageRole::Assistant, &reply).await.map_err(store_err)?;

        let mut state = conversation.state.clone();
        state.turn += 1;

        let max_turns = skill.as_ref().map(|s| s.max_turns).unwrap_or(DEFAULT_MAX_TURNS);
        let completing = state.phase == Phase::Active && state.turn >= max_turns;
        if completing {
            state.phase = Phase::Complete;
            self.hand_off_transcript(skill.as_ref(), id, &conversation.channel_id).await?;
        }

        self.store
            .update(id, ConversationUpdate::new().state(state).llm_provider(provider_used))
            .await
            .map_err(store_err)?;

        Ok(Some(reply))
    }

    async fn hand_off_transcript(
        &self,
        skill: Option<&SkillConfig>,
        id: &ConversationId,
        channel: &str,
    ) -> Result<(), AgentError> {
        let (Some(skill), Some(output)) = (skill, self.output.as_ref()) else {
            return Ok(());
        };
        if skill.output.is_none() {
            return Ok(());
        }

        let transcript = self.store.messages(id).await.map_err(store_err)?;
        if let Err(error) = output.handle(skill, &transcript, channel).await {
            // The conversation still completes; losing the artifact is
            // better than wedging the thread.
            warn!(skill = %skill.name, error = %error, "transcript handoff failed");
        }
        Ok(())
    }

    /// Executes embedded `[[ACTION:name|k=v|...]]` directives against the
    /// service collaborator, replacing each with its result in reverse
    /// document order. With no collaborator configured the text passes
    /// through untouched.
    pub async fn process_actions(&self, text: String) -> String {
        let (Some(services), Some(pattern)) =
            (self.services.as_ref(), self.action_directive.as_ref())
        else {
            return text;
        };

        let directives: Vec<(std::ops::Range<usize>, String, String)> = pattern
            .captures_iter(&text)
            .filter_map(|captures| {
                let full = captures.get(0)?;
                let name = captures.get(1)?.as_str().to_string();
                let params = captures.get(2).map(|m| m.as_str()).unwrap_or("").to_string();
                Some((full.range(), name, params))
            })
            .collect();

        let mut result = text;
        for (range, name, params) in directives.into_iter().rev() {
            let replacement = match parse_params(&params) {
                Ok(params) => self.run_action(services.as_ref(), &name, &params).await,
                Err(bad) => format!("[Action {name} failed: could not parse `{bad}`]"),
            };
            result.replace_range(range, &replacement);
        }
        result
    }

    async fn run_action(
        &self,
        services: &dyn WorkspaceServices,
        name: &str,
        params: &HashMap<String, String>,
    ) -> String {
        match name {
            "search_email" => {
                let query = params.get("query").map(String::as_str).unwrap_or("");
                match services.search_email(query).await {
                    Ok(emails) => format_email_results(&emails),
                    Err(error) => format!("[Action search_email failed: {error}]"),
                }
            }
            "read_email" => match params.get("id") {
                Some(id) => match services.read_email(id).await {
                    Ok(body) => body,
                    Err(error) => format!("[Action read_email failed: {error}]"),
                },
                None => "[Action read_email failed: missing `id` parameter]".to_string(),
            },
            "create_doc" => {
                let title = params.get("title").map(String::as_str).unwrap_or("Untitled");
                let content = params.get("content").map(String::as_str).unwrap_or("");
                match services.create_doc(title, content).await {
                    Ok(link) => format!("Created document: {link}"),
                    Err(error) => format!("[Action create_doc failed: {error}]"),
                }
            }
            "list_files" => {
                let query = params.get("query").map(String::as_str).unwrap_or("");
                match services.list_files(query).await {
                    Ok(files) => format_file_results(&files),
                    Err(error) => format!("[Action list_files failed: {error}]"),
                }
            }
            other => format!("[Unknown action: {other}]"),
        }
    }

    /// Capability notes and optional unread-mail prefetch appended to a
    /// skill's system prompt. Prefetch failures are logged, never fatal.
    async fn service_context(&self, skill: &SkillConfig) -> String {
        let Some(services) = self.services.as_ref() else {
            return String::new();
        };
        if skill.services.is_empty() {
            return String::new();
        }

        let mut context = String::new();

        let gmail = skill.services.iter().any(|s| s == "gmail") && services.has_gmail();
        if gmail {
            context.push_str(
                "\n\nYou have read-only access to the user's Gmail. \
                 You can search and read emails but CANNOT send anything.",
            );
        }
        if skill.services.iter().any(|s| s == "drive") && services.has_drive() {
            context.push_str(
                "\n\nYou have access to the user's Drive. You can create documents \
                 and list files but CANNOT share or delete anything.",
            );
        }

        if gmail && skill.auto_fetch_unread {
            match services.unread_emails(UNREAD_FETCH_LIMIT).await {
                Ok(emails) if emails.is_empty() => {
                    context.push_str("\n\nNo unread emails.");
                }
                Ok(emails) => {
                    context.push_str("\n\nUnread emails:");
                    for email in &emails {
                        context.push_str(&format!("\n- {}: {}", email.sender, email.subject));
                    }
                }
                Err(error) => {
                    warn!(skill = %skill.name, error = %error, "unread prefetch failed");
                }
            }
        }

        context
    }
}

/// Concatenates a skill's briefing, question lists, participants, output
/// note, and the turn budget reminder into the conversation's fixed prompt.
pub fn build_system_prompt(skill: &SkillConfig) -> String {
    let mut prompt = skill.context.trim().to_string();

    if !skill.fixed_questions.is_empty() {
        prompt.push_str("\n\nFixed questions to ask:");
        for question in &skill.fixed_questions {
            prompt.push_str(&format!("\n- {question}"));
        }
    }

    if !skill.rotating_questions.is_empty() {
        prompt.push_str("\n\nRotating questions (pick one per session):");
        for question in &skill.rotating_questions {
            prompt.push_str(&format!("\n- {question}"));
        }
    }

    if !skill.participants.is_empty() {
        prompt.push_str(&format!("\n\nParticipants: {}", skill.participants.join(", ")));
    }

    if let Some(output) = skill.output.as_ref() {
        prompt.push_str(&format!("\n\nOutput format: {}", output.format.as_str()));
    }

    prompt.push_str(&format!(
        "\n\nThis conversation should complete within {} turns. \
         When you've gathered enough information, summarize and wrap up.",
        skill.max_turns
    ));

    prompt
}

fn parse_params(raw: &str) -> Result<HashMap<String, String>, String> {
    let mut params = HashMap::new();
    for piece in raw.split('|') {
        if piece.is_empty() {
            continue;
        }
        let Some((key, value)) = piece.split_once('=') else {
            return Err(piece.to_string());
        };
        params.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(params)
}

fn store_err(error: RepositoryError) -> AgentError {
    AgentError::Persistence(error.to_string())
}

fn provider_err(error: ProviderError) -> AgentError {
    AgentError::Provider(error.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::{Mutex, RwLock};

    use skipper_core::conversation::{ConversationId, MessageRole, Phase, StoredMessage};
    use skipper_core::registry::SkillRegistry;
    use skipper_core::skill::{OutputConfig, OutputFormat, SkillConfig, Trigger};
    use skipper_db::repositories::ConversationStore;
    use skipper_db::InMemoryConversationStore;

    use super::{build_system_prompt, ConversationRuntime};
    use crate::llm::{ChatMessage, LlmBackend, ProviderError};
    use crate::output::{OutputError, OutputSink};
    use crate::router::ProviderRouter;
    use crate::services::{DriveFile, EmailSummary, ServiceError, WorkspaceServices};
    use crate::SharedRegistry;

    struct EchoBackend;

    #[async_trait]
    impl LlmBackend for EchoBackend {
        async fn complete(
            &self,
            _system_prompt: Option<&str>,
            history: &[ChatMessage],
        ) -> Result<String, ProviderError> {
            let last = history.last().map(|m| m.content.as_str()).unwrap_or("");
            Ok(format!("reply to: {last}"))
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: AtomicUsize,
        transcripts: Mutex<Vec<Vec<StoredMessage>>>,
    }

    #[async_trait]
    impl OutputSink for RecordingSink {
        async fn handle(
            &self,
            _skill: &SkillConfig,
            transcript: &[StoredMessage],
            _channel: &str,
        ) -> Result<(), OutputError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.transcripts.lock().await.push(transcript.to_vec());
            Ok(())
        }
    }

    struct StubServices {
        unread_fails: bool,
    }

    #[async_trait]
    impl WorkspaceServices for StubServices {
        fn has_gmail(&self) -> bool {
            true
        }

        fn has_drive(&self) -> bool {
            true
        }

        async fn search_email(&self, query: &str) -> Result<Vec<EmailSummary>, ServiceError> {
            if query == "none" {
                return Ok(Vec::new());
            }
            Ok(vec![EmailSummary {
                id: "m1".to_string(),
                sender: "pat@example.com".to_string(),
                subject: format!("about {query}"),
                snippet: "details inside".to_string(),
            }])
        }

        async fn read_email(&self, _id: &str) -> Result<String, ServiceError> {
            Err(ServiceError::Failed("message expired".to_string()))
        }

        async fn unread_emails(&self, _limit: usize) -> Result<Vec<EmailSummary>, ServiceError> {
            if self.unread_fails {
                return Err(ServiceError::Failed("quota exceeded".to_string()));
            }
            Ok(vec![EmailSummary {
                id: "m2".to_string(),
                sender: "sam@example.com".to_string(),
                subject: "Build broken".to_string(),
                snippet: String::new(),
            }])
        }

        async fn create_doc(&self, _title: &str, _content: &str) -> Result<String, ServiceError> {
            Ok("https://docs.example.com/d/1".to_string())
        }

        async fn list_files(&self, _query: &str) -> Result<Vec<DriveFile>, ServiceError> {
            Ok(vec![DriveFile {
                id: "f1".to_string(),
                name: "notes.md".to_string(),
                link: "https://drive.example.com/f1".to_string(),
            }])
        }
    }

    fn registry_with(skill: SkillConfig) -> SharedRegistry {
        let mut registry = SkillRegistry::new("unused");
        registry.insert(skill);
        Arc::new(RwLock::new(registry))
    }

    fn router() -> Arc<ProviderRouter> {
        Arc::new(ProviderRouter::new(Arc::new(EchoBackend), Arc::new(EchoBackend), None))
    }

    fn short_skill() -> SkillConfig {
        let mut skill = SkillConfig::new("standup", Trigger::Scheduled);
        skill.schedule = Some("0 9 * * 1-5".to_string());
        skill.context = "You run the team standup.".to_string();
        skill.max_turns = 2;
        skill.output = Some(OutputConfig {
            format: OutputFormat::Markdown,
            save_to: None,
            post_to_channel: None,
        });
        skill
    }

    fn runtime_with(
        store: Arc<InMemoryConversationStore>,
        registry: SharedRegistry,
        services: Option<Arc<dyn WorkspaceServices>>,
        output: Option<Arc<dyn OutputSink>>,
    ) -> ConversationRuntime {
        ConversationRuntime::new(store, registry, router(), services, output)
    }

    #[tokio::test]
    async fn start_skill_persists_system_and_assistant_with_turn_one() {
        let store = Arc::new(InMemoryConversationStore::default());
        let skill = short_skill();
        let runtime = runtime_with(store.clone(), registry_with(skill.clone()), None, None);

        let (reply, id) =
            runtime.start_skill(&skill, "C1", "U1", "171.1").await.expect("start");

        assert!(reply.contains("Begin the conversation."));

        let conversation = store.find_by_id(&id).await.expect("find").expect("present");
        assert_eq!(conversation.state.turn, 1);
        assert_eq!(conversation.state.phase, Phase::Active);
        assert_eq!(conversation.skill_name.as_deref(), Some("standup"));

        let messages = store.messages(&id).await.expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.contains("You run the team standup."));
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn continue_unknown_conversation_returns_none() {
        let store = Arc::new(InMemoryConversationStore::default());
        let runtime =
            runtime_with(store, registry_with(short_skill()), None, None);

        let result = runtime
            .continue_conversation(&ConversationId("nope".to_string()), "hello")
            .await
            .expect("continue");

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn reaching_max_turns_completes_and_hands_off_once() {
        let store = Arc::new(InMemoryConversationStore::default());
        let sink = Arc::new(RecordingSink::default());
        let skill = short_skill();
        let runtime = runtime_with(
            store.clone(),
            registry_with(skill.clone()),
            None,
            Some(sink.clone()),
        );

        let (_, id) = runtime.start_skill(&skill, "C1", "U1", "171.2").await.expect("start");
        let reply = runtime
            .continue_conversation(&id, "shipped the parser, no blockers")
            .await
            .expect("continue")
            .expect("known conversation");
        assert!(!reply.is_empty());

        let conversation = store.find_by_id(&id).await.expect("find").expect("present");
        assert_eq!(conversation.state.phase, Phase::Complete);
        assert_eq!(conversation.state.turn, 2);

        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
        let transcripts = sink.transcripts.lock().await;
        let roles: Vec<MessageRole> = transcripts[0].iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![
                MessageRole::System,
                MessageRole::Assistant,
                MessageRole::User,
                MessageRole::Assistant
            ]
        );
    }

    #[tokio::test]
    async fn completion_without_output_config_skips_the_sink() {
        let store = Arc::new(InMemoryConversationStore::default());
        let sink = Arc::new(RecordingSink::default());
        let mut skill = short_skill();
        skill.output = None;
        let runtime = runtime_with(
            store,
            registry_with(skill.clone()),
            None,
            Some(sink.clone()),
        );

        let (_, id) = runtime.start_skill(&skill, "C1", "U1", "171.3").await.expect("start");
        runtime.continue_conversation(&id, "done").await.expect("continue");

        assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn action_directives_are_substituted_in_place() {
        let store = Arc::new(InMemoryConversationStore::default());
        let services: Arc<dyn WorkspaceServices> =
            Arc::new(StubServices { unread_fails: false });
        let runtime =
            runtime_with(store, registry_with(short_skill()), Some(services), None);

        let text = "Let me check.\n\
                    [[ACTION:search_email|query=invoices]]\n\
                    And that message:\n\
                    [[ACTION:read_email|id=m9]]\n\
                    Done."
            .to_string();

        let processed = runtime.process_actions(text).await;

        assert!(processed.contains("about invoices"));
        assert!(processed.contains("failed"));
        assert!(!processed.contains("[[ACTION:"));
    }

    #[tokio::test]
    async fn unknown_actions_get_an_explicit_marker() {
        let store = Arc::new(InMemoryConversationStore::default());
        let services: Arc<dyn WorkspaceServices> =
            Arc::new(StubServices { unread_fails: false });
        let runtime =
            runtime_with(store, registry_with(short_skill()), Some(services), None);

        let processed = runtime
            .process_actions("[[ACTION:send_email|to=pat@example.com]]".to_string())
            .await;

        assert_eq!(processed, "[Unknown action: send_email]");
    }

    #[tokio::test]
    async fn malformed_parameters_render_a_parse_failure() {
        let store = Arc::new(InMemoryConversationStore::default());
        let services: Arc<dyn WorkspaceServices> =
            Arc::new(StubServices { unread_fails: false });
        let runtime =
            runtime_with(store, registry_with(short_skill()), Some(services), None);

        let processed =
            runtime.process_actions("[[ACTION:search_email|garbage]]".to_string()).await;

        assert!(processed.contains("could not parse"));
        assert!(!processed.contains("[[ACTION:"));
    }

    #[tokio::test]
    async fn without_services_directives_pass_through_untouched() {
        let store = Arc::new(InMemoryConversationStore::default());
        let runtime = runtime_with(store, registry_with(short_skill()), None, None);

        let text = "[[ACTION:search_email|query=x]]".to_string();
        let processed = runtime.process_actions(text.clone()).await;

        assert_eq!(processed, text);
    }

    #[tokio::test]
    async fn unread_prefetch_failure_does_not_block_start() {
        let store = Arc::new(InMemoryConversationStore::default());
        let services: Arc<dyn WorkspaceServices> =
            Arc::new(StubServices { unread_fails: true });
        let mut skill = short_skill();
        skill.services = vec!["gmail".to_string()];
        skill.auto_fetch_unread = true;
        let runtime = runtime_with(
            store.clone(),
            registry_with(skill.clone()),
            Some(services),
            None,
        );

        let (_, id) = runtime.start_skill(&skill, "C1", "U1", "171.4").await.expect("start");

        let messages = store.messages(&id).await.expect("messages");
        assert!(messages[0].content.contains("read-only access to the user's Gmail"));
        assert!(!messages[0].content.contains("Unread emails:"));
    }

    #[tokio::test]
    async fn unread_prefetch_lands_in_the_system_prompt() {
        let store = Arc::new(InMemoryConversationStore::default());
        let services: Arc<dyn WorkspaceServices> =
            Arc::new(StubServices { unread_fails: false });
        let mut skill = short_skill();
        skill.services = vec!["gmail".to_string()];
        skill.auto_fetch_unread = true;
        let runtime = runtime_with(
            store.clone(),
            registry_with(skill.clone()),
            Some(services),
            None,
        );

        let (_, id) = runtime.start_skill(&skill, "C1", "U1", "171.5").await.expect("start");

        let messages = store.messages(&id).await.expect("messages");
        assert!(messages[0].content.contains("Unread emails:"));
        assert!(messages[0].content.contains("sam@example.com: Build broken"));
    }

    #[test]
    fn system_prompt_includes_questions_participants_and_turn_budget() {
        let mut skill = short_skill();
        skill.fixed_questions = vec!["What did you do yesterday?".to_string()];
        skill.rotating_questions = vec!["Any blockers?".to_string()];
        skill.participants = vec!["alice".to_string(), "bob".to_string()];

        let prompt = build_system_prompt(&skill);

        assert!(prompt.starts_with("You run the team standup."));
        assert!(prompt.contains("Fixed questions to ask:\n- What did you do yesterday?"));
        assert!(prompt.contains("Rotating questions (pick one per session):\n- Any blockers?"));
        assert!(prompt.contains("Participants: alice, bob"));
        assert!(prompt.contains("complete within 2 turns"));
    }
}
