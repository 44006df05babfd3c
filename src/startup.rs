use log::{error, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;

use crate::config::{AppConfig, IndexBackend, ProviderKind};
use crate::database::{Database, InMemoryIndex, VectorDB, VectorIndex};
use crate::document::{Chunker, DocumentLoader};
use crate::error::AssistantError;
use crate::knowledge_base::{IngestProgress, IngestionReport, KnowledgeBase, KnowledgeSettings};
use crate::llm::{AnsweringAgent, ChatSession, PromptBuilder};
use crate::profile::AssistantProfile;
use crate::providers::{CompletionProvider, EmbeddingProvider, OllamaProvider, OpenAIProvider};

/// The ordered steps of bringing the assistant up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    ConnectIndex,
    CheckEmbedder,
    BuildKnowledgeBase,
    DiscoverDocuments,
    IngestDocuments,
    PrepareAgent,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ConnectIndex => "connecting to the vector index",
            Self::CheckEmbedder => "checking the embedding model",
            Self::BuildKnowledgeBase => "building the knowledge base",
            Self::DiscoverDocuments => "looking for documents",
            Self::IngestDocuments => "ingesting documents",
            Self::PrepareAgent => "preparing the assistant",
        }
    }
}

#[derive(Error, Debug)]
#[error("startup failed while {}: {error}", .phase.label())]
pub struct StartupFailure {
    pub phase: Phase,
    #[source]
    pub error: AssistantError,
}

/// Receives one status line per phase while the assistant starts.
pub trait StartupReporter {
    fn phase_started(&mut self, phase: Phase);
    fn phase_succeeded(&mut self, phase: Phase, detail: &str);
    fn phase_failed(&mut self, phase: Phase, error: &AssistantError);
    fn ingest_progress(&mut self, _progress: &IngestProgress<'_>) {}
}

/// The external collaborators the assistant is built from.
pub struct Services {
    pub index: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub model: Arc<dyn CompletionProvider>,
    pub manifest: Option<Database>,
}

impl Services {
    /// Connects to the configured backends. Nothing here talks to the
    /// models yet; that happens in the startup phases.
    pub async fn connect(config: &AppConfig) -> Result<Self, StartupFailure> {
        let index: Arc<dyn VectorIndex> = match config.index.backend {
            IndexBackend::Qdrant => {
                let db = VectorDB::new(
                    &config.index.endpoint_url,
                    &config.index.collection_name,
                    config.index.api_key.as_deref(),
                    config.index.timeout,
                )
                .await
                .map_err(|e| fail(Phase::ConnectIndex, AssistantError::from_startup_index(e)))?;
                Arc::new(db)
            }
            IndexBackend::Memory => Arc::new(InMemoryIndex::new()),
        };

        let embedder: Arc<dyn EmbeddingProvider> = match config.embedder.provider {
            ProviderKind::Ollama => Arc::new(
                OllamaProvider::new(&config.embedder.base_url, &config.embedder.model_id, config.embedder.timeout)
                    .map_err(|e| fail(Phase::CheckEmbedder, AssistantError::EmbeddingUnavailable(e.to_string())))?,
            ),
            ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(
                config.openai_api_key.as_deref().unwrap_or_default(),
                &config.embedder.base_url,
                &config.embedder.model_id,
            )),
        };

        let model: Arc<dyn CompletionProvider> = match config.model.provider {
            ProviderKind::Ollama => Arc::new(
                OllamaProvider::new(&config.model.base_url, &config.model.model_id, config.model.response_timeout)
                    .map_err(|e| fail(Phase::PrepareAgent, AssistantError::ModelUnavailable(e.to_string())))?
                    .with_temperature(config.model.temperature),
            ),
            ProviderKind::OpenAI => Arc::new(
                OpenAIProvider::new(
                    config.openai_api_key.as_deref().unwrap_or_default(),
                    &config.model.base_url,
                    &config.model.model_id,
                )
                .with_temperature(config.model.temperature),
            ),
        };

        let manifest = match &config.manifest_path {
            Some(path) => Some(
                Database::new(path)
                    .await
                    .map_err(|e| fail(Phase::BuildKnowledgeBase, e.into()))?,
            ),
            None => None,
        };

        Ok(Self { index, embedder, model, manifest })
    }
}

/// A started assistant: the knowledge base, the agent over it and the
/// outcome of the last ingestion.
pub struct Assistant {
    pub config: AppConfig,
    pub knowledge: Arc<KnowledgeBase>,
    pub agent: Arc<AnsweringAgent>,
    pub profile: AssistantProfile,
    pub model_info: String,
    loader: DocumentLoader,
    last_ingestion: Mutex<IngestionReport>,
}

impl Assistant {
    pub fn session(&self) -> ChatSession {
        ChatSession::new(self.agent.clone())
    }

    pub fn loader(&self) -> &DocumentLoader {
        &self.loader
    }

    pub fn last_ingestion(&self) -> IngestionReport {
        self.last_ingestion.lock().clone()
    }

    /// Runs ingestion over the documents folder again. Unchanged documents
    /// are skipped unless `force` is set.
    pub async fn reindex<F>(&self, force: bool, progress: F) -> Result<IngestionReport, AssistantError>
    where
        F: FnMut(IngestProgress<'_>),
    {
        let report = self.knowledge.ingest_folder(&self.loader, force, progress).await?;
        *self.last_ingestion.lock() = report.clone();
        Ok(report)
    }
}

pub async fn initialize(
    config: AppConfig,
    reporter: &mut dyn StartupReporter,
) -> Result<Assistant, StartupFailure> {
    let services = match Services::connect(&config).await {
        Ok(services) => services,
        Err(failure) => {
            reporter.phase_failed(failure.phase, &failure.error);
            return Err(failure);
        }
    };
    initialize_with(config, services, reporter).await
}

/// Walks the phases in order and stops at the first failure. The chat
/// interface gets nothing until every phase has succeeded.
pub async fn initialize_with(
    config: AppConfig,
    services: Services,
    reporter: &mut dyn StartupReporter,
) -> Result<Assistant, StartupFailure> {
    let Services { index, embedder, model, manifest } = services;

    run_phase(reporter, Phase::ConnectIndex, async {
        timeout(config.index.timeout, index.ping())
            .await
            .map_err(|_| AssistantError::IndexUnavailable("timed out".to_string()))?
            .map_err(AssistantError::from_startup_index)?;
        Ok::<_, AssistantError>(((), format!("{} index reachable", index.backend_name())))
    })
    .await?;

    let dimension = run_phase(reporter, Phase::CheckEmbedder, async {
        let dimension = probe_dimension(embedder.as_ref(), config.embedder.timeout).await?;
        if let Some(expected) = config.embedder.dimension {
            if expected != dimension {
                return Err(AssistantError::DimensionMismatch { expected, actual: dimension });
            }
        }
        Ok::<_, AssistantError>((dimension, format!("{} ({} dimensions)", embedder.embedding_model(), dimension)))
    })
    .await?;

    let knowledge = run_phase(reporter, Phase::BuildKnowledgeBase, async {
        let chunker = Chunker::from_config(&config.chunking)?;
        let kb = KnowledgeBase::new(
            chunker,
            embedder.clone(),
            index.clone(),
            manifest,
            dimension,
            KnowledgeSettings::from_config(&config),
        )
        .await?;
        Ok::<_, AssistantError>((Arc::new(kb), config.index.collection_name.clone()))
    })
    .await?;

    let loader = DocumentLoader::new(&config.documents_path);
    let paths = run_phase(reporter, Phase::DiscoverDocuments, async {
        let paths = loader.discover().await?;
        let detail = format!("{} PDF files", paths.len());
        Ok::<_, AssistantError>((paths, detail))
    })
    .await?;

    reporter.phase_started(Phase::IngestDocuments);
    let ingested = {
        let reporter_ref = &mut *reporter;
        knowledge
            .ingest_paths(&loader, &paths, config.force_reindex, |progress| reporter_ref.ingest_progress(&progress))
            .await
    };
    let report = match ingested {
        Ok(report) if report.all_failed() => {
            Err(AssistantError::IngestionFailed { failed: report.failed.len() })
        }
        other => other,
    }
    .map_err(|error| {
        error!("Startup phase {:?} failed: {}", Phase::IngestDocuments, error);
        reporter.phase_failed(Phase::IngestDocuments, &error);
        fail(Phase::IngestDocuments, error)
    })?;
    reporter.phase_succeeded(
        Phase::IngestDocuments,
        &format!(
            "{} indexed, {} skipped, {} failed",
            report.succeeded,
            report.skipped,
            report.failed.len()
        ),
    );

    let (agent, profile, model_info) = run_phase(reporter, Phase::PrepareAgent, async {
        let profile = AssistantProfile::load(config.assistant.profile_path.as_deref())?;
        let model_info = timeout(config.model.response_timeout, model.get_model_info())
            .await
            .map_err(|_| AssistantError::ModelUnavailable("timed out".to_string()))?
            .map_err(|e| AssistantError::ModelUnavailable(e.to_string()))?;

        let system_prompt = profile.generate_system_prompt(
            &config.assistant.language,
            &config.assistant.not_found_message,
        );
        let prompts = PromptBuilder::new(
            &config.assistant.language,
            &config.assistant.not_found_message,
            config.retrieval.max_context_chars,
        );
        let agent = AnsweringAgent::new(
            knowledge.clone(),
            model.clone(),
            prompts,
            system_prompt,
            config.retrieval.top_k,
            config.model.response_timeout,
        );

        let detail = format!("{} ready with {}", profile.name, model_info);
        Ok::<_, AssistantError>(((Arc::new(agent), profile, model_info), detail))
    })
    .await?;

    Ok(Assistant {
        config,
        knowledge,
        agent,
        profile,
        model_info,
        loader,
        last_ingestion: Mutex::new(report),
    })
}

/// Embeds a probe sentence to learn the vector size the model produces.
pub async fn probe_dimension(
    embedder: &dyn EmbeddingProvider,
    limit: Duration,
) -> Result<usize, AssistantError> {
    let vector = timeout(limit, embedder.generate_embedding("dimension probe"))
        .await
        .map_err(|_| AssistantError::EmbeddingUnavailable("timed out".to_string()))?
        .map_err(|e| AssistantError::EmbeddingUnavailable(e.to_string()))?;

    if vector.is_empty() {
        return Err(AssistantError::EmbeddingUnavailable(format!(
            "{} returned an empty vector",
            embedder.embedding_model()
        )));
    }
    Ok(vector.len())
}

async fn run_phase<T, Fut>(
    reporter: &mut dyn StartupReporter,
    phase: Phase,
    work: Fut,
) -> Result<T, StartupFailure>
where
    Fut: std::future::Future<Output = Result<(T, String), AssistantError>>,
{
    reporter.phase_started(phase);
    match work.await {
        Ok((value, detail)) => {
            info!("Startup phase {:?} done: {}", phase, detail);
            reporter.phase_succeeded(phase, &detail);
            Ok(value)
        }
        Err(error) => {
            error!("Startup phase {:?} failed: {}", phase, error);
            reporter.phase_failed(phase, &error);
            Err(fail(phase, error))
        }
    }
}

fn fail(phase: Phase, error: AssistantError) -> StartupFailure {
    StartupFailure { phase, error }
}
