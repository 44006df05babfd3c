use colored::Colorize;
use log::warn;
use std::future::Future;
use std::io;
use std::sync::Arc;

use crate::llm::{ChatSession, ConversationTurn};
use crate::startup::Assistant;

pub mod diagnostics;
mod document;
mod system;

pub use diagnostics::ConsoleReporter;

/// Whether the input loop should keep reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Continue,
    Exit,
}

/// Routes terminal input: known commands are handled here, anything else is
/// a question for the assistant.
pub struct CommandHandler {
    assistant: Arc<Assistant>,
    session: ChatSession,
}

impl CommandHandler {
    pub fn new(assistant: Arc<Assistant>) -> Self {
        let session = assistant.session();
        Self { assistant, session }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<CommandOutcome, String> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(CommandOutcome::Continue);
        }

        let (command, argument) = match input.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, rest.trim()),
            None => (input, ""),
        };

        match (command.to_lowercase().as_str(), argument) {
            ("help", "") => system::print_help(&self.assistant.profile),
            ("exit" | "quit", "") => {
                println!("👋 Goodbye!");
                return Ok(CommandOutcome::Exit);
            }
            ("clear", "") => {
                self.session.clear();
                println!("{}", "🗑️  Conversation cleared.".bright_green());
            }
            ("history", "") => system::print_history(self.session.history()),
            ("status", "") => system::print_status(&self.assistant).await?,
            ("docs", "") => document::list_documents(&self.assistant),
            ("reindex", "") => document::reindex(&self.assistant, false).await?,
            ("reindex", "--force") => document::reindex(&self.assistant, true).await?,
            ("forget", name) if !name.is_empty() => document::forget(&self.assistant, name).await?,
            _ => self.ask(input).await,
        }

        Ok(CommandOutcome::Continue)
    }

    async fn ask(&mut self, question: &str) {
        let spinner = diagnostics::thinking_spinner();
        let cancel = until_interrupted(tokio::signal::ctrl_c());

        let turn = self.session.ask_or_cancel(question, cancel).await;
        spinner.finish_and_clear();

        match turn {
            Some(turn) => print_turn(turn),
            None => println!("{}", "⏹  Cancelled, ask again whenever you like.".yellow()),
        }
    }
}

pub fn print_turn(turn: &ConversationTurn) {
    if turn.is_error {
        println!("\n🤖 {}\n", turn.text.red());
        return;
    }

    println!("\n🤖 {}", turn.text.bright_white());
    if !turn.citations.is_empty() {
        println!("   {} {}", "📄 Sources:".dimmed(), turn.citations.join(", ").bright_yellow());
    }
    println!();
}

/// Completes once `signal` fires. A handler that could not be installed
/// never fires, so the question runs to the end instead of being cancelled.
async fn until_interrupted<S>(signal: S)
where
    S: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        warn!("Ctrl-C handler unavailable, questions cannot be cancelled: {}", e);
        std::future::pending::<()>().await;
    }
}
