#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use study_notes_assistant::config::DEFAULT_NOT_FOUND_MESSAGE;
use study_notes_assistant::database::{Database, InMemoryIndex};
use study_notes_assistant::document::{Chunker, Document};
use study_notes_assistant::knowledge_base::{KnowledgeBase, KnowledgeSettings};
use study_notes_assistant::llm::{AnsweringAgent, PromptBuilder};
use study_notes_assistant::profile::AssistantProfile;
use study_notes_assistant::providers::{CompletionProvider, EmbeddingProvider};

pub const DIMENSION: usize = 512;

pub const CORPUS: &[(&str, &str)] = &[
    (
        "veri_yapilari.pdf",
        "A stack follows LIFO order. Push places an element on top of the stack and pop \
         removes the most recently pushed element. A queue follows FIFO order, so the first \
         element enqueued is the first one dequeued.",
    ),
    (
        "algoritmalar.pdf",
        "Binary search repeatedly halves a sorted range until the target is found. Merge sort \
         splits the list, sorts both halves and merges them in linear time.",
    ),
    (
        "python_notlari.pdf",
        "A for loop in Python iterates over any iterable. Lists are mutable sequences while \
         tuples are immutable sequences.",
    ),
];

const STOPWORDS: &[&str] = &["the", "an", "of", "is", "in", "and", "to", "so", "on", "what", "does", "it"];

/// Hashed bag of words: texts sharing words end up close under cosine.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { calls: AtomicUsize::new(0) })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn bucket(word: &str) -> usize {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMENSION as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut vector = vec![0.0; DIMENSION];
        let lowered = text.to_lowercase();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1 && !STOPWORDS.contains(w))
        {
            vector[bucket(word)] += 1.0;
        }
        Ok(vector)
    }

    fn embedding_model(&self) -> &str {
        "hash-bow"
    }
}

/// Language model double that counts calls and remembers the last prompt.
pub struct ScriptedModel {
    pub calls: AtomicUsize,
    pub reply: std::result::Result<String, String>,
    pub delay: Option<Duration>,
    pub last_prompt: Mutex<Option<String>>,
    pub available: bool,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: Ok(reply.to_string()),
            delay: None,
            last_prompt: Mutex::new(None),
            available: true,
        })
    }

    pub fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: Err(message.to_string()),
            delay: None,
            last_prompt: Mutex::new(None),
            available: true,
        })
    }

    pub fn slow(reply: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: Ok(reply.to_string()),
            delay: Some(delay),
            last_prompt: Mutex::new(None),
            available: true,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedModel {
    async fn complete(&self, _system_message: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock() = Some(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(|e| anyhow!(e))
    }

    async fn get_model_info(&self) -> Result<String> {
        if self.available {
            Ok("scripted".to_string())
        } else {
            Err(anyhow!("model 'scripted' is not pulled"))
        }
    }

    fn chat_model(&self) -> &str {
        "scripted"
    }
}

pub fn settings() -> KnowledgeSettings {
    KnowledgeSettings {
        retry_backoff: Duration::from_millis(1),
        ..KnowledgeSettings::default()
    }
}

pub async fn knowledge_base_with(
    index: Arc<InMemoryIndex>,
    embedder: Arc<HashEmbedder>,
    manifest: Option<Database>,
) -> KnowledgeBase {
    KnowledgeBase::new(
        Chunker::new(200, 50).unwrap(),
        embedder,
        index,
        manifest,
        DIMENSION,
        settings(),
    )
    .await
    .unwrap()
}

/// A knowledge base over [`CORPUS`], already ingested.
pub async fn indexed_corpus() -> (Arc<KnowledgeBase>, Arc<InMemoryIndex>, Arc<HashEmbedder>) {
    let index = Arc::new(InMemoryIndex::new());
    let embedder = HashEmbedder::new();
    let kb = knowledge_base_with(index.clone(), embedder.clone(), None).await;
    for (id, text) in CORPUS {
        kb.ingest_document(&Document::new(*id, *text), false).await.unwrap();
    }
    (Arc::new(kb), index, embedder)
}

pub fn agent(
    knowledge: Arc<KnowledgeBase>,
    model: Arc<ScriptedModel>,
    response_timeout: Duration,
) -> Arc<AnsweringAgent> {
    let system_prompt = AssistantProfile::default().generate_system_prompt("Turkish", DEFAULT_NOT_FOUND_MESSAGE);
    Arc::new(AnsweringAgent::new(
        knowledge,
        model,
        PromptBuilder::new("Turkish", DEFAULT_NOT_FOUND_MESSAGE, 6000),
        system_prompt,
        5,
        response_timeout,
    ))
}

/// Smallest well-formed single-page PDF showing `text` in Helvetica.
/// `text` must not contain parentheses or backslashes.
pub fn minimal_pdf(text: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 72 712 Td ({}) Tj ET", text);
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
         /Resources << /Font << /F1 5 0 R >> >> >>"
            .to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
    for offset in offsets {
        pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref
        )
        .as_bytes(),
    );
    pdf
}
