pub mod claude;
pub mod ollama;

pub use claude::ClaudeBackend;
pub use ollama::OllamaBackend;
