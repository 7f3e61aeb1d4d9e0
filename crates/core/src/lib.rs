//! Core types for the Skipper agent
//!
//! This crate holds everything the rest of the workspace agrees on:
//! - `config` - layered configuration (file, env, programmatic overrides)
//! - `conversation` - conversation records and transcript messages
//! - `event` - the inbound chat event model
//! - `skill` - skill definitions and their validation rules
//! - `registry` - the on-disk skill catalog
//! - `errors` - the shared error taxonomy

pub mod config;
pub mod conversation;
pub mod errors;
pub mod event;
pub mod registry;
pub mod skill;

pub use config::{AppConfig, ConfigError, LoadOptions, ProviderKind};
pub use conversation::{
    Conversation, ConversationId, ConversationState, MessageRole, Phase, StoredMessage,
};
pub use errors::AgentError;
pub use event::InboundEvent;
pub use registry::{RegistryError, SkillRegistry};
pub use skill::{OutputConfig, OutputFormat, SkillConfig, Trigger};
