use thiserror::Error;

/// Failures surfaced by agent operations. Variants carry rendered detail
/// rather than source errors so they stay `Clone` for retry and test paths;
/// the layer that produced the failure logs the full cause.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("skill not found: {0}")]
    SkillNotFound(String),
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),
    #[error("invalid skill definition: {0}")]
    InvalidSkill(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("provider failure: {0}")]
    Provider(String),
    #[error("output delivery failure: {0}")]
    Output(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}
