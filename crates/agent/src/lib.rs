//! Agent runtime - intent classification, LLM routing, and skill execution
//!
//! This crate is the brain of the skipper system:
//! - Classifies inbound Slack messages into intents (`classifier`)
//! - Routes completions between a local model and a cloud model, escalating
//!   long conversations and falling back when the local model is down
//!   (`router`, `providers`)
//! - Runs multi-turn skill conversations with turn budgets and transcript
//!   hand-off (`runtime`, `output`)
//! - Creates and modifies skill definitions from natural language (`creator`)
//! - Fires scheduled skills from cron expressions (`scheduler`)
//!
//! # Key Types
//!
//! - `AgentCore` - Top-level dispatcher (see `orchestrator` module)
//! - `LlmBackend` - Pluggable trait over Ollama and Anthropic backends
//! - `ProviderRouter` - Escalation and fallback policy between backends
//!
//! # Routing Principle
//!
//! Provider choice never changes conversation semantics. A fallback to the
//! cloud backend is recorded on the conversation but the transcript, turn
//! budget, and output hand-off behave identically on either backend.

pub mod classifier;
pub mod creator;
pub mod llm;
pub mod orchestrator;
pub mod output;
pub mod prompts;
pub mod providers;
pub mod router;
pub mod runtime;
pub mod scheduler;
pub mod services;

use std::sync::Arc;

use tokio::sync::RwLock;

use skipper_core::registry::SkillRegistry;

/// Shared, hot-reloadable view of the skill registry.
pub type SharedRegistry = Arc<RwLock<SkillRegistry>>;

pub use classifier::{Classifier, Intent};
pub use creator::SkillCreator;
pub use orchestrator::{AgentCore, PENDING_THREAD};
pub use llm::{ChatMessage, LlmBackend, ProviderError};
pub use output::{OutputSink, TranscriptPoster, TranscriptWriter};
pub use providers::{ClaudeBackend, OllamaBackend};
pub use router::ProviderRouter;
pub use runtime::ConversationRuntime;
pub use scheduler::{SkillScheduler, SkillTrigger};
pub use services::WorkspaceServices;
