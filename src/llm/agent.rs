use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::error::AssistantError;
use crate::knowledge_base::{KnowledgeBase, Retrieval};
use crate::llm::prompt::PromptBuilder;
use crate::providers::traits::CompletionProvider;

/// Where the agent is in answering the current question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AgentState {
    Idle,
    Retrieving,
    Composing,
    Generating,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnswerKind {
    /// Generated from retrieved passages.
    Grounded,
    /// The notes do not cover the question.
    NotInNotes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    pub cited_documents: Vec<String>,
    pub kind: AnswerKind,
}

/// A language model reply reduced to text plus the documents it relied on.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub text: String,
    pub citations: Vec<String>,
}

impl ModelResponse {
    /// Citations are the retrieved documents the reply mentions by name. A
    /// reply naming none falls back to every document that supplied context,
    /// and a not-found reply cites nothing.
    pub fn normalize(raw: &str, context_documents: &[String], not_found_message: &str) -> Self {
        let text = raw.trim().to_string();

        if is_not_found(&text, not_found_message) {
            return Self { text, citations: Vec::new() };
        }

        let lowered = text.to_lowercase();
        let mentioned: Vec<String> = context_documents
            .iter()
            .filter(|id| mentions(&lowered, id))
            .cloned()
            .collect();

        let citations = if mentioned.is_empty() {
            context_documents.to_vec()
        } else {
            mentioned
        };
        Self { text, citations }
    }
}

fn comparable(text: &str) -> String {
    text.trim()
        .trim_end_matches(|c: char| c == '.' || c == '!')
        .trim()
        .to_lowercase()
}

pub fn is_not_found(text: &str, not_found_message: &str) -> bool {
    comparable(text) == comparable(not_found_message)
}

fn mentions(lowered_text: &str, document_id: &str) -> bool {
    let id = document_id.to_lowercase();
    let stem = id.strip_suffix(".pdf").unwrap_or(&id);
    contains_word(lowered_text, &id) || contains_word(lowered_text, stem)
}

/// Whole-name match: the neighbours of a hit must not continue a word, so
/// `notlar` is not found inside `notlarda`.
fn contains_word(text: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    text.match_indices(name).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + name.len()..].chars().next();
        !before.map_or(false, is_word) && !after.map_or(false, is_word)
    })
}

/// Answers one question at a time from the knowledge base.
pub struct AnsweringAgent {
    knowledge: Arc<KnowledgeBase>,
    model: Arc<dyn CompletionProvider>,
    prompts: PromptBuilder,
    system_prompt: String,
    top_k: usize,
    response_timeout: Duration,
    state: Mutex<AgentState>,
}

impl AnsweringAgent {
    pub fn new(
        knowledge: Arc<KnowledgeBase>,
        model: Arc<dyn CompletionProvider>,
        prompts: PromptBuilder,
        system_prompt: String,
        top_k: usize,
        response_timeout: Duration,
    ) -> Self {
        Self {
            knowledge,
            model,
            prompts,
            system_prompt,
            top_k,
            response_timeout,
            state: Mutex::new(AgentState::Idle),
        }
    }

    pub fn state(&self) -> AgentState {
        *self.state.lock()
    }

    pub fn knowledge(&self) -> &Arc<KnowledgeBase> {
        &self.knowledge
    }

    pub fn chat_model(&self) -> &str {
        self.model.chat_model()
    }

    pub fn not_found_message(&self) -> &str {
        self.prompts.not_found_message()
    }

    pub async fn answer(&self, question: &str) -> Result<Answer, AssistantError> {
        self.answer_or_cancel(question, std::future::pending()).await
    }

    /// Like [`answer`](Self::answer), but gives up as soon as `cancel`
    /// completes. Whatever call is in flight is dropped and the agent goes
    /// back to `Idle`.
    pub async fn answer_or_cancel<C>(&self, question: &str, cancel: C) -> Result<Answer, AssistantError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            result = self.run(question) => result,
            _ = cancel => {
                info!("Question cancelled");
                self.transition(AgentState::Idle);
                Err(AssistantError::Cancelled)
            }
        }
    }

    async fn run(&self, question: &str) -> Result<Answer, AssistantError> {
        let guard = InFlight { agent: self, finished: false };
        let result = self.steps(question).await;
        guard.finish(&result);
        result
    }

    async fn steps(&self, question: &str) -> Result<Answer, AssistantError> {
        self.transition(AgentState::Retrieving);
        let passages = match self.knowledge.retrieve(question, self.top_k).await? {
            Retrieval::Found(passages) => passages,
            Retrieval::NothingIndexed => {
                debug!("Index is empty, answering not-found");
                return Ok(self.not_in_notes());
            }
            Retrieval::NothingRelevant { best_score } => {
                debug!("Best score {:.3} under threshold, answering not-found", best_score);
                return Ok(self.not_in_notes());
            }
        };

        self.transition(AgentState::Composing);
        let prompt = self.prompts.compose(question, &passages);

        self.transition(AgentState::Generating);
        let raw = timeout(self.response_timeout, self.model.complete(&self.system_prompt, &prompt.text))
            .await
            .map_err(|_| {
                AssistantError::Generation(format!(
                    "no response within {} seconds",
                    self.response_timeout.as_secs()
                ))
            })?
            .map_err(|e| AssistantError::Generation(e.to_string()))?;

        if raw.trim().is_empty() {
            return Err(AssistantError::Generation("model returned an empty answer".to_string()));
        }

        let response = ModelResponse::normalize(&raw, &prompt.context_documents, self.prompts.not_found_message());
        let kind = if response.citations.is_empty() {
            AnswerKind::NotInNotes
        } else {
            AnswerKind::Grounded
        };

        Ok(Answer {
            text: response.text,
            cited_documents: response.citations,
            kind,
        })
    }

    fn not_in_notes(&self) -> Answer {
        Answer {
            text: self.prompts.not_found_message().to_string(),
            cited_documents: Vec::new(),
            kind: AnswerKind::NotInNotes,
        }
    }

    fn transition(&self, next: AgentState) {
        let mut state = self.state.lock();
        debug!("Agent {:?} -> {:?}", *state, next);
        *state = next;
    }
}

/// Tracks one question in flight. Dropping it before `finish`, as happens
/// when the caller goes away mid-answer, puts the agent back to `Idle`.
struct InFlight<'a> {
    agent: &'a AnsweringAgent,
    finished: bool,
}

impl InFlight<'_> {
    fn finish(mut self, result: &Result<Answer, AssistantError>) {
        self.finished = true;
        match result {
            Ok(_) => self.agent.transition(AgentState::Done),
            Err(_) => self.agent.transition(AgentState::Failed),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.agent.transition(AgentState::Idle);
        }
    }
}
