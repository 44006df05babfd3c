use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid { key: String, value: String, reason: String },
    #[error("{key}={value:?} is not a valid URL")]
    InvalidUrl { key: String, value: String },
    #[error("{0} must be set")]
    Missing(String),
}

/// Which service speaks for the embedder or the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    OpenAI,
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            other => Err(format!("unknown provider '{}', expected ollama or openai", other)),
        }
    }
}

impl ProviderKind {
    pub fn default_base_url(self) -> &'static str {
        match self {
            Self::Ollama => "http://localhost:11434",
            Self::OpenAI => "https://api.openai.com/v1",
        }
    }

    pub fn default_embedding_model(self) -> &'static str {
        match self {
            Self::Ollama => "openhermes",
            Self::OpenAI => "text-embedding-3-small",
        }
    }

    pub fn default_chat_model(self) -> &'static str {
        match self {
            Self::Ollama => "llama3.2",
            Self::OpenAI => "gpt-4o-mini",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAI => write!(f, "openai"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    Memory,
}

impl FromStr for IndexBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown index backend '{}', expected qdrant or memory", other)),
        }
    }
}

/// Chunk size and overlap are fixed for the whole corpus; they are not
/// adapted per document.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub endpoint_url: String,
    pub collection_name: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub query_attempts: usize,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub provider: ProviderKind,
    pub model_id: String,
    pub base_url: String,
    pub dimension: Option<usize>,
    pub timeout: Duration,
    pub concurrency: usize,
    pub cache_capacity: usize,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub model_id: String,
    pub base_url: String,
    pub temperature: f32,
    pub response_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Cosine similarity below which a passage is treated as unrelated.
    pub min_score: f32,
    pub max_context_chars: usize,
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub language: String,
    pub not_found_message: String,
    pub profile_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub documents_path: PathBuf,
    pub manifest_path: Option<PathBuf>,
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub embedder: EmbedderConfig,
    pub model: ModelConfig,
    pub retrieval: RetrievalConfig,
    pub assistant: AssistantConfig,
    pub openai_api_key: Option<String>,
    /// Ingest every document at startup even if the manifest says it is unchanged.
    pub force_reindex: bool,
}

pub const DEFAULT_NOT_FOUND_MESSAGE: &str = "Bu bilgi notlarda yok.";
pub const DEFAULT_MIN_SCORE: f32 = 0.3;

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to the
    /// defaults of a local Qdrant + Ollama setup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);
        let embedder_provider = vars.parse("EMBEDDER_PROVIDER", ProviderKind::Ollama)?;
        let model_provider = vars.parse("LLM_PROVIDER", ProviderKind::Ollama)?;

        let config = Self {
            documents_path: PathBuf::from(vars.string("DOCUMENTS_PATH", "documents")),
            manifest_path: match vars.get("MANIFEST_PATH") {
                Some(path) if path.eq_ignore_ascii_case("none") => None,
                Some(path) => Some(PathBuf::from(path)),
                None => Some(PathBuf::from("data/manifest.db")),
            },
            chunking: ChunkingConfig {
                chunk_size: vars.parse("CHUNK_SIZE", 1000)?,
                chunk_overlap: vars.parse("CHUNK_OVERLAP", 100)?,
            },
            index: IndexConfig {
                backend: vars.parse("INDEX_BACKEND", IndexBackend::Qdrant)?,
                endpoint_url: vars.string("QDRANT_URL", "http://localhost:6333"),
                collection_name: vars.string("QDRANT_COLLECTION", "ders_notlari"),
                api_key: vars.get("QDRANT_API_KEY"),
                timeout: Duration::from_secs(vars.parse("INDEX_TIMEOUT_SECS", 30)?),
                query_attempts: vars.parse("INDEX_QUERY_ATTEMPTS", 2)?,
            },
            embedder: EmbedderConfig {
                provider: embedder_provider,
                model_id: vars.string("EMBEDDER_MODEL", embedder_provider.default_embedding_model()),
                base_url: vars.string("EMBEDDER_URL", embedder_provider.default_base_url()),
                dimension: vars.parse_opt("EMBEDDING_DIMENSION")?,
                timeout: Duration::from_secs(vars.parse("EMBEDDER_TIMEOUT_SECS", 30)?),
                concurrency: vars.parse("EMBED_CONCURRENCY", 4)?,
                cache_capacity: vars.parse("EMBED_CACHE_CAPACITY", 256)?,
            },
            model: ModelConfig {
                provider: model_provider,
                model_id: vars.string("LLM_MODEL", model_provider.default_chat_model()),
                base_url: vars.string("LLM_URL", model_provider.default_base_url()),
                temperature: vars.parse("LLM_TEMPERATURE", 0.2)?,
                response_timeout: Duration::from_secs(vars.parse("LLM_TIMEOUT_SECS", 120)?),
            },
            retrieval: RetrievalConfig {
                top_k: vars.parse("RETRIEVAL_TOP_K", 5)?,
                min_score: vars.parse("RETRIEVAL_MIN_SCORE", DEFAULT_MIN_SCORE)?,
                max_context_chars: vars.parse("RETRIEVAL_MAX_CONTEXT_CHARS", 6000)?,
            },
            assistant: AssistantConfig {
                language: vars.string("ASSISTANT_LANGUAGE", "Turkish"),
                not_found_message: vars.string("ASSISTANT_NOT_FOUND_MESSAGE", DEFAULT_NOT_FOUND_MESSAGE),
                profile_path: vars.get("ASSISTANT_PROFILE").map(PathBuf::from),
            },
            openai_api_key: vars.get("OPENAI_API_KEY"),
            force_reindex: vars.parse("FORCE_REINDEX", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(invalid("CHUNK_SIZE", chunking.chunk_size, "must be greater than zero"));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(invalid(
                "CHUNK_OVERLAP",
                chunking.chunk_overlap,
                &format!("must be less than CHUNK_SIZE ({})", chunking.chunk_size),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(invalid("RETRIEVAL_TOP_K", self.retrieval.top_k, "must be greater than zero"));
        }
        if self.retrieval.max_context_chars == 0 {
            return Err(invalid(
                "RETRIEVAL_MAX_CONTEXT_CHARS",
                self.retrieval.max_context_chars,
                "must be greater than zero",
            ));
        }
        if !(-1.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(invalid(
                "RETRIEVAL_MIN_SCORE",
                self.retrieval.min_score,
                "must be a cosine similarity between -1 and 1",
            ));
        }
        if self.embedder.concurrency == 0 {
            return Err(invalid("EMBED_CONCURRENCY", self.embedder.concurrency, "must be greater than zero"));
        }
        if self.index.query_attempts == 0 {
            return Err(invalid("INDEX_QUERY_ATTEMPTS", self.index.query_attempts, "must be greater than zero"));
        }
        if self.embedder.dimension == Some(0) {
            return Err(invalid("EMBEDDING_DIMENSION", 0, "must be greater than zero"));
        }
        if self.assistant.not_found_message.trim().is_empty() {
            return Err(invalid("ASSISTANT_NOT_FOUND_MESSAGE", "", "must not be empty"));
        }

        if self.index.backend == IndexBackend::Qdrant {
            check_url("QDRANT_URL", &self.index.endpoint_url)?;
        }
        check_url("EMBEDDER_URL", &self.embedder.base_url)?;
        check_url("LLM_URL", &self.model.base_url)?;

        let uses_openai = self.embedder.provider == ProviderKind::OpenAI
            || self.model.provider == ProviderKind::OpenAI;
        if uses_openai && self.openai_api_key.is_none() {
            return Err(ConfigError::Missing("OPENAI_API_KEY".to_string()));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None).expect("built-in defaults are valid")
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<'a, F: Fn(&str) -> Option<String>> Vars<'a, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parse_opt(key)?.unwrap_or(default))
    }

    fn parse_opt<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|e: T::Err| invalid(key, &value, &e.to_string())),
            None => Ok(None),
        }
    }
}

fn invalid(key: &str, value: impl std::fmt::Display, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_url(key: &str, value: &str) -> Result<(), ConfigError> {
    match Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
