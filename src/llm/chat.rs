use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::error::AssistantError;
use crate::llm::agent::{Answer, AnsweringAgent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub citations: Vec<String>,
    pub is_error: bool,
}

impl ConversationTurn {
    fn user(text: &str) -> Self {
        Self {
            role: Role::User,
            text: text.to_string(),
            timestamp: Utc::now(),
            citations: Vec::new(),
            is_error: false,
        }
    }

    fn assistant(answer: Answer) -> Self {
        Self {
            role: Role::Assistant,
            text: answer.text,
            timestamp: Utc::now(),
            citations: answer.cited_documents,
            is_error: false,
        }
    }

    fn error(error: &AssistantError) -> Self {
        Self {
            role: Role::Assistant,
            text: format!("❌ Bir hata oluştu: {}", error),
            timestamp: Utc::now(),
            citations: Vec::new(),
            is_error: true,
        }
    }
}

/// The one conversation of this process. History lives only in memory.
pub struct ChatSession {
    agent: Arc<AnsweringAgent>,
    history: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new(agent: Arc<AnsweringAgent>) -> Self {
        Self {
            agent,
            history: Vec::new(),
        }
    }

    pub fn agent(&self) -> &Arc<AnsweringAgent> {
        &self.agent
    }

    /// Records the question and the reply. Failures become an assistant
    /// error turn and the session carries on.
    pub async fn ask(&mut self, question: &str) -> &ConversationTurn {
        let question = question.trim();
        let result = self.agent.answer(question).await;
        self.record(question, result)
    }

    /// Returns `None` without touching the history if `cancel` fires first.
    pub async fn ask_or_cancel<C>(&mut self, question: &str, cancel: C) -> Option<&ConversationTurn>
    where
        C: Future<Output = ()>,
    {
        let question = question.trim();
        match self.agent.answer_or_cancel(question, cancel).await {
            Err(AssistantError::Cancelled) => None,
            result => Some(self.record(question, result)),
        }
    }

    fn record(&mut self, question: &str, result: Result<Answer, AssistantError>) -> &ConversationTurn {
        let reply = match result {
            Ok(answer) => ConversationTurn::assistant(answer),
            Err(error) => {
                log::warn!("Question failed: {}", error);
                ConversationTurn::error(&error)
            }
        };

        self.history.push(ConversationTurn::user(question));
        self.history.push(reply);
        &self.history[self.history.len() - 1]
    }

    pub fn history(&self) -> &[ConversationTurn] {
        &self.history
    }

    /// Forgets the conversation. The knowledge base is left as it is.
    pub fn clear(&mut self) {
        self.history.clear();
    }
}
