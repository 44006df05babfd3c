use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::database::{DatabaseError, VectorDBError};

/// Everything that can go wrong between startup and a finished answer.
///
/// Variants fall in two groups: startup conditions that halt the assistant
/// (see [`AssistantError::is_fatal`]) and per-turn conditions that are shown
/// inline in the conversation while the session keeps running.
#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("documents folder not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("no PDF documents found in {}", path.display())]
    EmptyCorpus { path: PathBuf },

    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("embedding model unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("vector index query failed: {0}")]
    IndexQuery(String),

    #[error("question embedding failed: {0}")]
    EmbeddingQuery(String),

    #[error("answer generation failed: {0}")]
    Generation(String),

    #[error("could not extract text from {document}: {message}")]
    Extraction { document: String, message: String },

    #[error("embedding dimension mismatch: index expects {expected}, embedder produced {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("none of the {failed} documents could be ingested")]
    IngestionFailed { failed: usize },

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("manifest error: {0}")]
    Manifest(#[from] DatabaseError),

    #[error("request cancelled")]
    Cancelled,
}

impl AssistantError {
    /// Startup conditions after which the chat interface must not open.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::EmptyCorpus { .. }
                | Self::IndexUnavailable(_)
                | Self::EmbeddingUnavailable(_)
                | Self::ModelUnavailable(_)
                | Self::DimensionMismatch { .. }
                | Self::IngestionFailed { .. }
                | Self::Config(_)
        )
    }

    /// An actionable hint shown under a startup failure.
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            Self::NotFound { .. } => Some("Create the documents folder or point DOCUMENTS_PATH at it"),
            Self::EmptyCorpus { .. } => Some("Add your PDF study notes to the documents folder"),
            Self::IndexUnavailable(_) => Some("Is Qdrant running? Check with `docker ps`"),
            Self::EmbeddingUnavailable(_) | Self::ModelUnavailable(_) => {
                Some("Is Ollama running and the model pulled? Check with `ollama list`")
            }
            Self::DimensionMismatch { .. } => {
                Some("Use a new QDRANT_COLLECTION or the embedder model the collection was built with")
            }
            Self::IngestionFailed { .. } => Some("Check that the PDFs contain extractable text"),
            Self::Config(_) => Some("Fix the value in your environment or .env file"),
            _ => None,
        }
    }

    /// Maps an index adapter error raised while the assistant is starting.
    pub fn from_startup_index(error: VectorDBError) -> Self {
        match error {
            VectorDBError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other => Self::IndexUnavailable(other.to_string()),
        }
    }

    /// Maps an index adapter error raised while answering a question.
    pub fn from_query_index(error: VectorDBError) -> Self {
        match error {
            VectorDBError::DimensionMismatch { expected, actual } => {
                Self::DimensionMismatch { expected, actual }
            }
            other => Self::IndexQuery(other.to_string()),
        }
    }
}
