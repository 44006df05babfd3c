use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use study_notes_assistant::api;
use study_notes_assistant::commands::{CommandHandler, CommandOutcome, ConsoleReporter};
use study_notes_assistant::config::{AppConfig, IndexBackend};
use study_notes_assistant::startup::{self, Assistant};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Ask questions about your PDF study notes", long_about = None)]
struct Args {
    /// Folder holding the PDF notes
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Vector index collection name
    #[arg(long)]
    collection: Option<String>,

    /// Index backend: qdrant or memory
    #[arg(long)]
    index: Option<IndexBackend>,

    /// Language the assistant answers in
    #[arg(long)]
    language: Option<String>,

    /// Ingest every document again, ignoring the manifest
    #[arg(long)]
    force_reindex: bool,

    #[arg(long)]
    api: bool,

    #[arg(long, default_value = "3000")]
    port: u16,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(documents) = &self.documents {
            config.documents_path = documents.clone();
        }
        if let Some(collection) = &self.collection {
            config.index.collection_name = collection.clone();
        }
        if let Some(backend) = self.index {
            config.index.backend = backend;
        }
        if let Some(language) = &self.language {
            config.assistant.language = language.clone();
        }
        config.force_reindex |= self.force_reindex;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("warn,study_notes_assistant=info"),
    )
    .init();

    let args = Args::parse();

    let mut config = AppConfig::from_env()?;
    args.apply(&mut config);
    config.validate()?;

    println!("{}", "🎓 Ders Notu Analiz Asistanı".bright_cyan().bold());
    println!("{}", "─".repeat(40).dimmed());

    let mut reporter = ConsoleReporter::new();
    let assistant = match startup::initialize(config, &mut reporter).await {
        Ok(assistant) => Arc::new(assistant),
        Err(failure) => {
            eprintln!("\n{}", failure.to_string().red().bold());
            std::process::exit(1);
        }
    };

    if args.api {
        run_api_server(assistant, args.port).await
    } else {
        run_cli_mode(assistant).await
    }
}

async fn run_cli_mode(assistant: Arc<Assistant>) -> Result<()> {
    let mut command_handler = CommandHandler::new(assistant);
    command_handler
        .handle_command("help")
        .await
        .map_err(anyhow::Error::msg)?;

    let mut rl = Editor::<(), DefaultHistory>::new()?;

    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                if !input.is_empty() {
                    let _ = rl.add_history_entry(input);
                }

                match command_handler.handle_command(input).await {
                    Ok(CommandOutcome::Exit) => break,
                    Ok(CommandOutcome::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}

async fn run_api_server(assistant: Arc<Assistant>, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = api::create_api(assistant);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    println!("Server successfully bound to {}", addr);
    println!("Ready to accept connections!");

    axum::serve(listener, app).await?;
    Ok(())
}
