use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::error::AssistantError;
use crate::knowledge_base::IngestProgress;
use crate::startup::{Phase, StartupReporter};

fn phase_icon(phase: Phase) -> &'static str {
    match phase {
        Phase::ConnectIndex => "📊",
        Phase::CheckEmbedder => "🧮",
        Phase::BuildKnowledgeBase => "📚",
        Phase::DiscoverDocuments => "📄",
        Phase::IngestDocuments => "🔄",
        Phase::PrepareAgent => "🤖",
    }
}

/// Prints one line per startup phase and a progress bar while ingesting.
#[derive(Default)]
pub struct ConsoleReporter {
    bar: IngestProgressBar,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StartupReporter for ConsoleReporter {
    fn phase_started(&mut self, phase: Phase) {
        println!("{} {}...", phase_icon(phase), capitalize(phase.label()));
    }

    fn phase_succeeded(&mut self, phase: Phase, detail: &str) {
        if phase == Phase::IngestDocuments {
            self.bar.finish();
        }
        println!("   {} {}", "✅".green(), detail.bright_green());
    }

    fn phase_failed(&mut self, phase: Phase, error: &AssistantError) {
        if phase == Phase::IngestDocuments {
            self.bar.finish();
        }
        println!("   {} {}", "❌".red(), error.to_string().red());
        if let Some(hint) = error.remediation() {
            println!("   💡 {}", hint.yellow());
        }
    }

    fn ingest_progress(&mut self, progress: &IngestProgress<'_>) {
        self.bar.update(progress);
    }
}

/// Progress bar over the documents of one ingestion run.
#[derive(Default)]
pub struct IngestProgressBar {
    bar: Option<ProgressBar>,
}

impl IngestProgressBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, progress: &IngestProgress<'_>) {
        match progress {
            IngestProgress::Started { document, position, total } => {
                let bar = self.bar.get_or_insert_with(|| {
                    let bar = ProgressBar::new(*total as u64);
                    bar.set_style(
                        ProgressStyle::default_bar()
                            .template("   {bar:30.cyan/blue} {pos}/{len} {msg}")
                            .unwrap_or_else(|_| ProgressStyle::default_bar()),
                    );
                    bar
                });
                bar.set_position(*position as u64 - 1);
                bar.set_message(document.to_string());
            }
            IngestProgress::Indexed { document, chunks } => {
                self.println(format!("   📄 {} ({} chunks)", document, chunks));
                self.inc();
            }
            IngestProgress::Skipped { document, reason } => {
                self.println(format!("   ⏭️  {} skipped: {}", document, reason).dimmed().to_string());
                self.inc();
            }
            IngestProgress::Failed { document, error } => {
                self.println(format!("   ⚠️  {}: {}", document, error).yellow().to_string());
                self.inc();
            }
        }
    }

    pub fn finish(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }

    fn inc(&self) {
        if let Some(bar) = &self.bar {
            bar.inc(1);
        }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => println!("{}", line),
        }
    }
}

pub fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("🤔 Thinking... (Ctrl-C to cancel)");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capitalizes_phase_labels() {
        assert_eq!(capitalize(Phase::ConnectIndex.label()), "Connecting to the vector index");
        assert_eq!(capitalize(""), "");
    }
}
