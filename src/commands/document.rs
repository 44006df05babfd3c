use colored::Colorize;

use super::diagnostics::IngestProgressBar;
use crate::startup::Assistant;

pub fn list_documents(assistant: &Assistant) {
    let documents = assistant.knowledge.documents();
    if documents.is_empty() {
        println!("{}", "No documents indexed.".yellow());
        return;
    }

    println!("\n📚 Indexed documents ({}):", documents.len());
    for entry in documents {
        println!(
            "  📄 {} - {} chunks, ingested {}",
            entry.document_id.bright_yellow(),
            entry.chunk_count,
            entry.ingested_at.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
}

pub async fn reindex(assistant: &Assistant, force: bool) -> Result<(), String> {
    println!(
        "🔄 Re-indexing {}{}",
        assistant.loader().folder().display().to_string().bright_yellow(),
        if force { " (forced)" } else { "" }
    );

    let mut bar = IngestProgressBar::new();
    let report = assistant
        .reindex(force, |progress| bar.update(&progress))
        .await
        .map_err(|e| format!("Re-index failed: {}", e))?;
    bar.finish();

    println!(
        "✅ {} indexed, {} skipped, {} failed",
        report.succeeded,
        report.skipped,
        report.failed.len()
    );
    for document in &report.removed {
        println!("  🗑️  {} removed (no longer in the folder)", document);
    }
    for (document, error) in &report.failed {
        println!("  {} {}: {}", "✗".red(), document, error);
    }
    Ok(())
}

pub async fn forget(assistant: &Assistant, document_id: &str) -> Result<(), String> {
    let removed = assistant
        .knowledge
        .remove_document(document_id)
        .await
        .map_err(|e| format!("Failed to remove {}: {}", document_id, e))?;

    if removed {
        println!("🗑️  {} removed from the index", document_id.bright_yellow());
    } else {
        println!("{}", format!("{} is not in the index", document_id).yellow());
    }
    Ok(())
}
