use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Local};
use thiserror::Error;
use tracing::info;

use skipper_core::conversation::{MessageRole, StoredMessage};
use skipper_core::skill::{OutputFormat, SkillConfig};

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("could not write transcript to `{path}`: {source}")]
    Write { path: PathBuf, source: std::io::Error },
    #[error("could not post transcript: {0}")]
    Post(String),
}

/// Receives a completed conversation's transcript. Called exactly once per
/// conversation, at the moment it flips to complete.
#[async_trait]
pub trait OutputSink: Send + Sync {
    async fn handle(
        &self,
        skill: &SkillConfig,
        transcript: &[StoredMessage],
        channel: &str,
    ) -> Result<(), OutputError>;
}

/// Posts rendered text somewhere visible (a channel). Implemented by the
/// chat layer; a sink without one only writes files.
#[async_trait]
pub trait TranscriptPoster: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<(), OutputError>;
}

/// Default sink: renders the transcript per the skill's output config,
/// saves it to the configured path, and optionally posts it back.
pub struct TranscriptWriter {
    poster: Option<Arc<dyn TranscriptPoster>>,
}

impl TranscriptWriter {
    pub fn new(poster: Option<Arc<dyn TranscriptPoster>>) -> Self {
        Self { poster }
    }
}

#[async_trait]
impl OutputSink for TranscriptWriter {
    async fn handle(
        &self,
        skill: &SkillConfig,
        transcript: &[StoredMessage],
        channel: &str,
    ) -> Result<(), OutputError> {
        let Some(output) = skill.output.as_ref() else {
            return Ok(());
        };

        let rendered = render_transcript(output.format, transcript);

        if let Some(template) = output.save_to.as_deref() {
            let path = resolve_save_path(template);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| OutputError::Write { path: path.clone(), source })?;
            }
            tokio::fs::write(&path, &rendered)
                .await
                .map_err(|source| OutputError::Write { path: path.clone(), source })?;
            info!(skill = %skill.name, path = %path.display(), "saved transcript");
        }

        if let Some(poster) = self.poster.as_ref() {
            let target = output.post_to_channel.as_deref().unwrap_or(channel);
            poster.post(target, &rendered).await?;
            info!(skill = %skill.name, channel = %target, "posted transcript");
        }

        Ok(())
    }
}

pub fn render_transcript(format: OutputFormat, transcript: &[StoredMessage]) -> String {
    match format {
        OutputFormat::Markdown => render_markdown(transcript),
        OutputFormat::Text => render_text(transcript),
    }
}

fn render_markdown(transcript: &[StoredMessage]) -> String {
    let mut lines = vec![format!("# Session - {}", Local::now().format("%Y-%m-%d %H:%M"))];
    lines.push(String::new());
    for message in transcript {
        match message.role {
            MessageRole::System => continue,
            MessageRole::User => lines.push(format!("**User**: {}", message.content)),
            MessageRole::Assistant => lines.push(format!("**Bot**: {}", message.content)),
        }
        lines.push(String::new());
    }
    lines.join("\n")
}

fn render_text(transcript: &[StoredMessage]) -> String {
    let mut parts = Vec::new();
    for message in transcript {
        match message.role {
            MessageRole::System => continue,
            MessageRole::User => parts.push(format!("User: {}", message.content)),
            MessageRole::Assistant => parts.push(format!("Bot: {}", message.content)),
        }
    }
    parts.join("\n\n")
}

/// Expands `{date}`, `{week}`, and a leading `~` in a save-path template.
/// `{week}` is the ISO week, rendered as `YYYY-Www`.
pub fn resolve_save_path(template: &str) -> PathBuf {
    let now = Local::now();
    let iso_week = now.iso_week();
    let mut resolved = template
        .replace("{date}", &now.format("%Y-%m-%d").to_string())
        .replace("{week}", &format!("{}-W{:02}", iso_week.year(), iso_week.week()));

    if let Some(rest) = resolved.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            resolved = format!("{home}/{rest}");
        }
    }

    PathBuf::from(resolved)
}
