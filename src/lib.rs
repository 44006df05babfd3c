pub mod api;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod error;
pub mod knowledge_base;
pub mod llm;
pub mod profile;
pub mod providers;
pub mod startup;

// Re-export commonly used items
pub use config::AppConfig;
pub use error::AssistantError;
pub use knowledge_base::{KnowledgeBase, Retrieval};
pub use llm::{Answer, AnsweringAgent, ChatSession};
pub use startup::{initialize, initialize_with, Assistant, Services, StartupFailure};
