pub mod ollama;
pub mod openai;
pub mod traits;

pub use ollama::ollama::OllamaProvider;
pub use openai::openai::OpenAIProvider;
pub use traits::{CompletionProvider, EmbeddingProvider};
