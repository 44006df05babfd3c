use colored::Colorize;

use crate::llm::{ConversationTurn, Role};
use crate::profile::AssistantProfile;
use crate::startup::Assistant;

pub fn print_help(profile: &AssistantProfile) {
    println!("\n🎓 {}", profile.name.bright_cyan().bold());
    println!("  Just type your question about your notes.");

    if !profile.example_questions.is_empty() {
        println!("  Examples:");
        for question in &profile.example_questions {
            println!("    - {}", question);
        }
    }
    println!();

    println!("💬 Conversation Commands:");
    println!("  history          - Show this conversation");
    println!("  clear            - Start a fresh conversation (keeps the index)");
    println!("  Ctrl-C           - Cancel the question being answered");
    println!();

    println!("📚 Document Commands:");
    println!("  docs             - List indexed documents");
    println!("  reindex          - Ingest new or changed PDFs");
    println!("  reindex --force  - Ingest every PDF again");
    println!("  forget <file>    - Remove a document from the index");
    println!();

    println!("⚙️ System Commands:");
    println!("  status  - Show index and model status");
    println!("  help    - Show this help menu");
    println!("  exit    - Exit the program");
    println!();
}

pub fn print_history(history: &[ConversationTurn]) {
    if history.is_empty() {
        println!("{}", "No messages yet.".dimmed());
        return;
    }

    for turn in history {
        let time = turn.timestamp.format("%H:%M:%S").to_string();
        match turn.role {
            Role::User => println!("{} 👤 {}", time.dimmed(), turn.text.bright_white()),
            Role::Assistant if turn.is_error => println!("{} 🤖 {}", time.dimmed(), turn.text.red()),
            Role::Assistant => {
                println!("{} 🤖 {}", time.dimmed(), turn.text);
                if !turn.citations.is_empty() {
                    println!("         📄 {}", turn.citations.join(", ").bright_yellow());
                }
            }
        }
    }
}

pub async fn print_status(assistant: &Assistant) -> Result<(), String> {
    let knowledge = &assistant.knowledge;
    let entries = knowledge.entry_count().await.map_err(|e| e.to_string())?;
    let report = assistant.last_ingestion();

    println!("\n⚙️ System Status:");
    println!(
        "  {} {} index, {} entries, {} dimensions",
        "✅".green(),
        knowledge.index().backend_name(),
        entries,
        knowledge.dimension()
    );
    println!("  {} Embedder: {}", "✅".green(), knowledge.embedding_model());
    println!("  {} Model: {}", "✅".green(), assistant.model_info);
    println!(
        "  {} Last ingestion: {} indexed, {} skipped, {} failed",
        if report.failed.is_empty() { "✅".green() } else { "⚠️".yellow() },
        report.succeeded,
        report.skipped,
        report.failed.len()
    );
    for (document, error) in &report.failed {
        println!("     {} {}: {}", "✗".red(), document, error);
    }
    println!("  Agent state: {:?}", assistant.agent.state());
    println!();
    Ok(())
}
