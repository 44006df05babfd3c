use anyhow::Result;
use async_trait::async_trait;

/// Turns text into a fixed-length vector. Identical input with an identical
/// model must give an identical vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>>;

    fn embedding_model(&self) -> &str;
}

/// A chat-style language model answering one prompt at a time.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String>;

    /// Confirms the model is reachable and installed, returning a short
    /// description of it.
    async fn get_model_info(&self) -> Result<String>;

    fn chat_model(&self) -> &str;
}
