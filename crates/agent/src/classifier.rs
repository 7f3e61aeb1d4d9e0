use regex::Regex;

use skipper_core::conversation::Conversation;
use skipper_core::event::InboundEvent;
use skipper_core::registry::SkillRegistry;
use skipper_core::skill::SkillConfig;
use skipper_db::repositories::RepositoryError;
use skipper_db::ConversationStore;

/// What an inbound event turned out to be, with the context the handler
/// needs attached.
#[derive(Clone, Debug)]
pub enum Intent {
    /// Reply inside a thread that maps to a known conversation. Completed
    /// conversations still classify here; thread lookup ignores phase.
    Continuation { conversation: Conversation, text: String },
    /// Request to edit an existing skill definition.
    SkillModification { text: String },
    /// Request to create a new skill or recurring workflow.
    Command { text: String },
    /// Bot mention in a channel with at least one bound mention skill.
    Mention { skills: Vec<SkillConfig>, stripped_text: String },
    /// Unaddressed channel message picked up by the most recently active
    /// skill conversation in that channel.
    Ambient { conversation: Conversation, text: String },
    /// Anything else; answered as free-form chat.
    General { text: String },
}

const COMMAND_PATTERNS: &[&str] = &[
    r"\bplease\b.*\b(start|begin|create|set up|schedule)\b",
    r"\b(remind|check in|contact|notify)\b.*\b(me|us)\b.*\b(every|daily|weekly)\b",
    r"\b(make|generate|build|create)\b.*\b(a |the )?(skill|routine|workflow|list|plan)\b",
    r"\b(can you|could you|would you)\b.*\b(start|begin|set up)\b",
];

const MODIFICATION_PATTERNS: &[&str] = &[
    r"\b(change|modify|update|edit|adjust)\b.*\b(skill|routine|check-?in|schedule)\b",
    r"\badd a question\b",
    r"\bchange it to\b",
    r"\bremove the\b.*\bquestion\b",
];

/// Maps an inbound event to an [`Intent`], first match wins.
///
/// Priority: thread continuation, then modification patterns, then command
/// patterns, then mention, then ambient pickup, then general. Continuation
/// outranks the pattern rules so replies inside a skill thread are never
/// misread as creation requests.
pub struct Classifier {
    bot_user_id: String,
    command_patterns: Vec<Regex>,
    modification_patterns: Vec<Regex>,
}

impl Classifier {
    pub fn new(bot_user_id: impl Into<String>) -> Self {
        Self {
            bot_user_id: bot_user_id.into(),
            command_patterns: compile(COMMAND_PATTERNS),
            modification_patterns: compile(MODIFICATION_PATTERNS),
        }
    }

    pub async fn classify(
        &self,
        event: &InboundEvent,
        store: &dyn ConversationStore,
        registry: &SkillRegistry,
    ) -> Result<Intent, RepositoryError> {
        if let Some(thread_ts) = event.thread_ts.as_deref() {
            if let Some(conversation) = store.find_by_thread(thread_ts).await? {
                return Ok(Intent::Continuation { conversation, text: event.text.clone() });
            }
        }

        let lowered = event.text.to_lowercase();

        if self.modification_patterns.iter().any(|pattern| pattern.is_match(&lowered)) {
            return Ok(Intent::SkillModification { text: event.text.clone() });
        }

        if self.command_patterns.iter().any(|pattern| pattern.is_match(&lowered)) {
            return Ok(Intent::Command { text: event.text.clone() });
        }

        if event.text.contains(&format!("<@{}>", self.bot_user_id)) {
            let mut refs: Vec<&str> = vec![event.channel.as_str()];
            if let Some(name) = event.channel_name.as_deref() {
                refs.push(name);
            }
            let skills: Vec<SkillConfig> =
                registry.mention_skills_for(&refs).into_iter().cloned().collect();
            if !skills.is_empty() {
                let stripped_text = strip_leading_mention(&event.text);
                return Ok(Intent::Mention { skills, stripped_text });
            }
        }

        let active = store.list_active_for_channel(&event.channel).await?;
        if let Some(conversation) = active.into_iter().next() {
            return Ok(Intent::Ambient { conversation, text: event.text.clone() });
        }

        Ok(Intent::General { text: event.text.clone() })
    }
}

/// Removes a leading `<@USER>` token and the whitespace after it. Mentions
/// elsewhere in the text are left alone.
fn strip_leading_mention(text: &str) -> String {
    let trimmed = text.trim_start();
    if let Some(rest) = trimmed.strip_prefix("<@") {
        if let Some(close) = rest.find('>') {
            return rest[close + 1..].trim_start().to_string();
        }
    }
    trimmed.to_string()
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match Regex::new(pattern) {
            Ok(regex) => Some(regex),
            Err(_) => None,
        })
        .collect()
}
