pub mod agent;
pub mod chat;
pub mod embeddings;
pub mod prompt;

pub use agent::{AgentState, Answer, AnswerKind, AnsweringAgent, ModelResponse};
pub use chat::{ChatSession, ConversationTurn, Role};
pub use embeddings::CachedEmbedder;
pub use prompt::{ComposedPrompt, PromptBuilder};
