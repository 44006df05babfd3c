mod common;

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use common::*;
use study_notes_assistant::config::AppConfig;
use study_notes_assistant::database::{Database, InMemoryIndex, VectorIndex};
use study_notes_assistant::error::AssistantError;
use study_notes_assistant::startup::{initialize_with, Phase, Services, StartupReporter};
use tempfile::{tempdir, TempDir};

#[derive(Default)]
struct Recorder {
    started: Vec<Phase>,
    succeeded: Vec<Phase>,
    failed: Vec<Phase>,
}

impl StartupReporter for Recorder {
    fn phase_started(&mut self, phase: Phase) {
        self.started.push(phase);
    }

    fn phase_succeeded(&mut self, phase: Phase, _detail: &str) {
        self.succeeded.push(phase);
    }

    fn phase_failed(&mut self, phase: Phase, _error: &AssistantError) {
        self.failed.push(phase);
    }
}

fn config_for(dir: &TempDir, folder: &str) -> AppConfig {
    let vars: HashMap<&str, String> = HashMap::from([
        ("DOCUMENTS_PATH", dir.path().join(folder).display().to_string()),
        ("INDEX_BACKEND", "memory".to_string()),
        ("MANIFEST_PATH", "none".to_string()),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

fn services(model: Arc<ScriptedModel>) -> Services {
    Services {
        index: Arc::new(InMemoryIndex::new()),
        embedder: HashEmbedder::new(),
        model,
        manifest: None,
    }
}

#[tokio::test]
async fn empty_corpus_never_opens_the_chat() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("documents")).unwrap();
    let model = ScriptedModel::replying("unused");
    let mut recorder = Recorder::default();

    let failure = initialize_with(config_for(&dir, "documents"), services(model.clone()), &mut recorder)
        .await
        .err()
        .unwrap();

    assert_eq!(failure.phase, Phase::DiscoverDocuments);
    assert!(matches!(failure.error, AssistantError::EmptyCorpus { .. }));
    assert!(failure.error.is_fatal());
    assert_eq!(
        recorder.succeeded,
        vec![Phase::ConnectIndex, Phase::CheckEmbedder, Phase::BuildKnowledgeBase]
    );
    assert_eq!(recorder.failed, vec![Phase::DiscoverDocuments]);
    assert!(!recorder.started.contains(&Phase::PrepareAgent));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn missing_folder_halts_startup() {
    let dir = tempdir().unwrap();
    let mut recorder = Recorder::default();

    let failure = initialize_with(config_for(&dir, "missing"), services(ScriptedModel::replying("")), &mut recorder)
        .await
        .err()
        .unwrap();

    assert!(matches!(failure.error, AssistantError::NotFound { .. }));
    assert!(failure.error.remediation().is_some());
}

#[tokio::test]
async fn unreadable_pdfs_fail_ingestion() {
    let dir = tempdir().unwrap();
    let folder = dir.path().join("documents");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("broken.pdf"), b"definitely not a pdf").unwrap();
    let mut recorder = Recorder::default();

    let failure = initialize_with(config_for(&dir, "documents"), services(ScriptedModel::replying("")), &mut recorder)
        .await
        .err()
        .unwrap();

    assert_eq!(failure.phase, Phase::IngestDocuments);
    assert!(matches!(failure.error, AssistantError::IngestionFailed { failed: 1 }));
    assert!(failure.to_string().contains("ingesting documents"));
}

#[tokio::test]
async fn configured_dimension_must_match_the_embedder() {
    let dir = tempdir().unwrap();
    let mut config = config_for(&dir, "documents");
    config.embedder.dimension = Some(DIMENSION + 1);
    let mut recorder = Recorder::default();

    let failure = initialize_with(config, services(ScriptedModel::replying("")), &mut recorder)
        .await
        .err()
        .unwrap();

    assert_eq!(failure.phase, Phase::CheckEmbedder);
    assert!(matches!(
        failure.error,
        AssistantError::DimensionMismatch { expected, actual } if expected == DIMENSION + 1 && actual == DIMENSION
    ));
}

#[tokio::test]
async fn one_unreadable_pdf_does_not_stop_the_rest() {
    let dir = tempdir().unwrap();
    let folder = dir.path().join("documents");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("a_veri_yapilari.pdf"), minimal_pdf("A stack follows LIFO order")).unwrap();
    fs::write(folder.join("b_broken.pdf"), b"definitely not a pdf").unwrap();
    let mut recorder = Recorder::default();

    let assistant = initialize_with(config_for(&dir, "documents"), services(ScriptedModel::replying("")), &mut recorder)
        .await
        .unwrap();

    let report = assistant.last_ingestion();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "b_broken.pdf");
    assert!(recorder.failed.is_empty());
    assert_eq!(recorder.succeeded.last(), Some(&Phase::PrepareAgent));
    assert!(assistant.knowledge.entry_count().await.unwrap() > 0);
}

#[tokio::test]
async fn reindex_removes_deleted_documents() {
    let dir = tempdir().unwrap();
    let folder = dir.path().join("documents");
    fs::create_dir(&folder).unwrap();
    fs::write(folder.join("algoritmalar.pdf"), minimal_pdf("Binary search halves a sorted range")).unwrap();
    fs::write(folder.join("veri_yapilari.pdf"), minimal_pdf("A stack follows LIFO order")).unwrap();

    let index = Arc::new(InMemoryIndex::new());
    let services = Services {
        index: index.clone(),
        embedder: HashEmbedder::new(),
        model: ScriptedModel::replying(""),
        manifest: Some(Database::in_memory().await.unwrap()),
    };
    let mut recorder = Recorder::default();
    let assistant = initialize_with(config_for(&dir, "documents"), services, &mut recorder)
        .await
        .unwrap();
    assert_eq!(assistant.last_ingestion().succeeded, 2);

    fs::remove_file(folder.join("veri_yapilari.pdf")).unwrap();
    let report = assistant.reindex(false, |_| {}).await.unwrap();

    assert_eq!(report.removed, vec!["veri_yapilari.pdf"]);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.succeeded, 0);
    assert_eq!(index.count_document("veri_yapilari.pdf").await.unwrap(), 0);
    assert!(index.count_document("algoritmalar.pdf").await.unwrap() > 0);
    let remaining: Vec<String> = assistant.knowledge.documents().into_iter().map(|e| e.document_id).collect();
    assert_eq!(remaining, vec!["algoritmalar.pdf"]);
}
