//! rag-assistant command line
//!
//! Run with: cargo run -p rag-assistant -- --help

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use walkdir::WalkDir;

use rag_assistant::index::PersistentVectorStore;
use rag_assistant::{
    AskResponse, ChatHistory, Credentials, ExportFormat, FileType, IngestReport, RagConfig,
    RagOrchestrator, SearchType,
};

#[derive(Parser, Debug)]
#[command(name = "rag-assistant", version)]
#[command(about = "Ask questions about your PDF, text and markdown documents")]
struct Cli {
    /// Configuration file (TOML). Defaults to $RAG_CONFIG, then the user config directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the vector index
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a new index from files and directories, replacing the existing one
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Add files and directories to the existing index
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a single question against the existing index
    Ask {
        question: String,
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },
    /// Interactive question loop
    Chat {
        #[command(flatten)]
        retrieval: RetrievalArgs,
        /// Write the conversation to this file on exit
        #[arg(long)]
        export: Option<PathBuf>,
        /// Export format: json, txt or csv
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Show index and configuration status
    Stats,
}

#[derive(clap::Args, Debug)]
struct RetrievalArgs {
    /// Number of chunks to retrieve
    #[arg(short, long)]
    k: Option<usize>,
    /// Re-rank retrieved chunks for diversity (MMR)
    #[arg(long)]
    mmr: bool,
    /// Minimum similarity score
    #[arg(long)]
    threshold: Option<f32>,
}

impl RetrievalArgs {
    fn to_patch(&self) -> Option<serde_json::Value> {
        let mut patch = serde_json::Map::new();
        if let Some(k) = self.k {
            patch.insert("k".into(), k.into());
        }
        if self.mmr {
            patch.insert("search_type".into(), SearchType::Mmr.to_string().into());
        }
        if let Some(threshold) = self.threshold {
            patch.insert("score_threshold".into(), threshold.into());
        }
        (!patch.is_empty()).then(|| serde_json::Value::Object(patch))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rag_assistant=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let credentials = Credentials::from_env()
        .context("set GOOGLE_API_KEY to your Gemini API key before running rag-assistant")?;

    let mut config = RagConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(dir) = &cli.index_dir {
        config.vector_db.persist_directory = dir.clone();
    }
    let index_dir = config.vector_db.persist_directory.clone();

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);
    tracing::info!("  - Index directory: {}", index_dir.display());

    let rag = RagOrchestrator::with_gemini(config, credentials)?;

    match cli.command {
        Command::Ingest { paths } => {
            let files = expand_paths(&paths);
            if files.is_empty() {
                anyhow::bail!("no supported files (.pdf, .txt, .md) found");
            }
            println!("Ingesting {} files...", files.len());

            let report = rag.ingest_all(&files).await?;
            print_report(&report, &index_dir);
        }
        Command::Add { paths } => {
            if let Err(e) = rag.open_existing(&index_dir).await {
                // Only a missing index may be replaced by a fresh build
                if PersistentVectorStore::exists(&index_dir) {
                    return Err(e).with_context(|| {
                        format!("cannot add to the index at {}", index_dir.display())
                    });
                }
                println!("No index at {}, building a new one", index_dir.display());
            }

            let files = expand_paths(&paths);
            if files.is_empty() {
                anyhow::bail!("no supported files (.pdf, .txt, .md) found");
            }

            let report = rag.add_all(&files).await?;
            print_report(&report, &index_dir);
        }
        Command::Ask {
            question,
            retrieval,
        } => {
            rag.open_existing(&index_dir)
                .await
                .with_context(|| format!("no usable index at {}", index_dir.display()))?;
            if let Some(patch) = retrieval.to_patch() {
                rag.configure("retrieval", patch).await?;
            }

            let response = rag.ask(&question).await;
            print_response(&response);
            if response.is_error() {
                std::process::exit(1);
            }
        }
        Command::Chat {
            retrieval,
            export,
            format,
        } => {
            let format: ExportFormat = format.parse()?;
            rag.open_existing(&index_dir)
                .await
                .with_context(|| format!("no usable index at {}", index_dir.display()))?;
            if let Some(patch) = retrieval.to_patch() {
                rag.configure("retrieval", patch).await?;
            }

            let history = chat_loop(&rag).await?;

            if let Some(path) = export {
                std::fs::write(&path, history.export(format)?)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Conversation exported to {}", path.display());
            }
        }
        Command::Stats => {
            open_index(&rag, &index_dir).await;
            let stats = rag.stats().await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

/// Open the index if one exists; a missing index is not an error here
async fn open_index(rag: &RagOrchestrator, index_dir: &Path) {
    if let Err(e) = rag.open_existing(index_dir).await {
        tracing::warn!("No index opened: {}", e);
    }
}

async fn chat_loop(rag: &RagOrchestrator) -> anyhow::Result<ChatHistory> {
    let mut history = ChatHistory::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Ask a question (/stats for history statistics, /exit to quit)");
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line {
            "" => continue,
            "/exit" | "/quit" | "exit" | "quit" => break,
            "/stats" => {
                println!("{}", serde_json::to_string_pretty(&history.statistics())?);
                continue;
            }
            "/clear" => {
                history.clear();
                println!("History cleared");
                continue;
            }
            _ => {}
        }

        let response = rag.ask(line).await;
        print_response(&response);
        history.record(&response);
    }

    Ok(history)
}

/// Expand directories (recursively) into the supported files they contain
fn expand_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| FileType::from_path(p).is_some())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            // Files are passed through so the loader can report why they were skipped
            files.push(path.clone());
        }
    }
    files
}

fn print_report(report: &IngestReport, index_dir: &Path) {
    println!("\nIngestion complete!");
    println!("  Files:      {}", report.files_requested);
    println!("  Documents:  {}", report.documents_loaded);
    println!("  Chunks:     {}", report.chunks_indexed);
    println!("  Time:       {}ms", report.processing_time_ms);
    println!("  Index:      {}", index_dir.display());

    if !report.failures.is_empty() {
        println!("\nSkipped files:");
        for failure in &report.failures {
            println!("  {}: {}", failure.path, failure.reason);
        }
    }
}

fn print_response(response: &AskResponse) {
    println!("\n{}\n", response.answer);
    if response.citations.is_empty() {
        return;
    }

    println!("Sources ({} chunks, {}ms):", response.confidence, response.processing_time_ms);
    for citation in &response.citations {
        println!(
            "  {} {} (score {:.2})",
            if citation.cited { "*" } else { "-" },
            citation.format_inline(),
            citation.score
        );
        println!("      {}", citation.snippet.replace('\n', " "));
    }
    println!();
}
