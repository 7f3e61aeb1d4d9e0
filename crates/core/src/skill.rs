use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ProviderKind;

pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 4;
pub const DEFAULT_MAX_TURNS: u32 = 8;

/// How a skill gets started.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fired by the scheduler from a cron expression.
    Scheduled,
    /// Started when the bot is mentioned in the skill's channel.
    Mention,
    /// Started by an explicit natural-language command.
    Command,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Mention => "mention",
            Self::Command => "command",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Markdown,
    Text,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_format")]
    pub format: OutputFormat,
    /// Destination path template; `{date}` and `{week}` placeholders are
    /// resolved at write time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_to_channel: Option<String>,
}

fn default_output_format() -> OutputFormat {
    OutputFormat::Markdown
}

/// A declarative skill definition loaded from a YAML file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkillConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub trigger: Trigger,
    /// Free-form briefing injected into the system prompt.
    #[serde(default)]
    pub context: String,
    /// 5-field cron expression; required when trigger is `scheduled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_user: Option<String>,
    /// Preferred provider; escalation can still promote local to cloud.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<ProviderKind>,
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u32,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixed_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rotating_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default)]
    pub auto_fetch_unread: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputConfig>,
}

fn default_escalation_threshold() -> u32 {
    DEFAULT_ESCALATION_THRESHOLD
}

fn default_max_turns() -> u32 {
    DEFAULT_MAX_TURNS
}

const KNOWN_SERVICES: &[&str] = &["gmail", "drive"];

impl SkillConfig {
    pub fn new(name: impl Into<String>, trigger: Trigger) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            trigger,
            context: String::new(),
            schedule: None,
            channel: None,
            target_user: None,
            llm: None,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            max_turns: DEFAULT_MAX_TURNS,
            fixed_questions: Vec::new(),
            rotating_questions: Vec::new(),
            participants: Vec::new(),
            services: Vec::new(),
            auto_fetch_unread: false,
            output: None,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("skill name must not be empty".to_string());
        }

        if self.trigger == Trigger::Scheduled {
            let missing = self
                .schedule
                .as_deref()
                .map(|schedule| schedule.trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(format!(
                    "skill `{}` has a scheduled trigger but no schedule",
                    self.name
                ));
            }
        }

        if self.max_turns == 0 {
            return Err(format!("skill `{}` must allow at least one turn", self.name));
        }

        for service in &self.services {
            if !KNOWN_SERVICES.contains(&service.as_str()) {
                warn!(skill = %self.name, service = %service, "skill references unknown service");
            }
        }

        Ok(())
    }
}
