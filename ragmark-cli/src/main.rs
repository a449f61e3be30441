//! `ragmark` — RAG question answering and exam grading from the terminal.
//!
//! Subcommands: `index` (build/rebuild the store), `query` (one-shot
//! question), `chat` (interactive loop), `grade` (grade an exam file),
//! `status` (engine snapshot). Every configuration flag has an
//! environment-variable fallback, enumerated in `--help`.

mod providers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ragmark_core::grader::{ExamGrader, ExamItem};
use ragmark_core::{RagEngine, render_report};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ragmark",
    version,
    about = "RAG question answering and exam grading over a control-systems knowledge base"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    /// Log filter (e.g. info, ragmark_core=debug)
    #[arg(long, global = true, env = "RAGMARK_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

/// Configuration surface shared by all subcommands.
#[derive(Args)]
pub struct ConfigArgs {
    /// Directory holding the knowledge-base documents
    #[arg(long, env = "RAGMARK_KNOWLEDGE_DIR", default_value = "knowledge_base")]
    pub knowledge_dir: PathBuf,

    /// Directory where the persistent vector store lives
    #[arg(long, env = "RAGMARK_STORE_DIR", default_value = "vector_store")]
    pub store_dir: PathBuf,

    /// Embedding provider: ollama, openai, or mock
    #[arg(long, env = "RAGMARK_EMBEDDING_PROVIDER", default_value = "ollama")]
    pub embedding_provider: String,

    /// Embedding model name
    #[arg(long, env = "RAGMARK_EMBEDDING_MODEL", default_value = "nomic-embed-text")]
    pub embedding_model: String,

    /// Embedding dimensionality (must match the model)
    #[arg(long, env = "RAGMARK_EMBEDDING_DIMENSIONS", default_value_t = 768)]
    pub embedding_dimensions: usize,

    /// Generator provider: ollama, openai, or mock
    #[arg(long, env = "RAGMARK_GENERATOR_PROVIDER", default_value = "ollama")]
    pub generator_provider: String,

    /// Generator model name
    #[arg(long, env = "RAGMARK_GENERATOR_MODEL", default_value = "llama3")]
    pub generator_model: String,

    /// Chunk window in characters
    #[arg(long, env = "RAGMARK_CHUNK_SIZE", default_value_t = 1000)]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in characters
    #[arg(long, env = "RAGMARK_CHUNK_OVERLAP", default_value_t = 200)]
    pub chunk_overlap: usize,

    /// Number of chunks retrieved per query
    #[arg(long, env = "RAGMARK_TOP_K", default_value_t = 4)]
    pub top_k: usize,

    /// Inclusive minimum similarity for retrieved chunks
    #[arg(long, env = "RAGMARK_SCORE_THRESHOLD")]
    pub score_threshold: Option<f32>,

    /// Compute device: auto, cpu, cuda, or cuda:N
    #[arg(long, env = "RAGMARK_DEVICE", default_value = "auto")]
    pub device: String,

    /// Fraction of accelerator memory the backend may claim
    #[arg(long, env = "RAGMARK_GPU_MEMORY_FRACTION", default_value_t = 0.8)]
    pub gpu_memory_fraction: f32,

    /// Timeout for each upstream request, in seconds
    #[arg(long, env = "RAGMARK_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Bounded retry count for transient upstream failures
    #[arg(long, env = "RAGMARK_MAX_RETRIES", default_value_t = 2)]
    pub max_retries: u32,

    /// Ollama server address
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_base_url: String,

    /// Override base URL for OpenAI-compatible servers
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the vector store from the knowledge base
    Index {
        /// Rebuild even if a store already exists
        #[arg(long)]
        force: bool,
    },
    /// Answer a single question and print its sources
    Query {
        /// The question to answer
        question: String,
        /// Override the configured top_k for this query
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Ask questions interactively
    Chat,
    /// Grade an exam file and write a results file
    Grade {
        /// JSON exam file: [{question, student_answer, correct_answer}, ...]
        #[arg(long)]
        exam: PathBuf,
        /// Where to write the JSON results (default: <exam>.results.json)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Also write a human-readable report here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the engine status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let engine = Arc::new(providers::build_engine(&cli.config)?);

    match cli.command {
        Command::Index { force } => cmd_index(&engine, force).await,
        Command::Query { question, top_k } => cmd_query(&engine, &question, top_k).await,
        Command::Chat => cmd_chat(&engine).await,
        Command::Grade { exam, out, report } => cmd_grade(engine, &exam, out, report).await,
        Command::Status => cmd_status(&engine).await,
    }
}

async fn cmd_index(engine: &RagEngine, force: bool) -> Result<()> {
    engine.initialize(force).await.context("failed to build the vector store")?;
    let status = engine.status().await;
    println!(
        "Indexed {} chunks into {} (embeddings: {})",
        status.records,
        engine.config().store_dir.display(),
        status.embedding_provider
    );
    Ok(())
}

async fn cmd_query(engine: &RagEngine, question: &str, top_k: Option<usize>) -> Result<()> {
    engine.initialize(false).await.context("failed to initialize the engine")?;
    let result = engine.query(question, top_k).await?;

    let rule = "=".repeat(78);
    println!("{rule}");
    println!("Question: {question}");
    println!("{}", "-".repeat(78));
    println!("Answer: {}", result.answer.trim());
    println!("{rule}");
    if !result.sources.is_empty() {
        println!("Sources:");
        for (i, source) in result.sources.iter().enumerate() {
            let name = source.get("source").map(String::as_str).unwrap_or("unknown");
            println!("  {}. {name}", i + 1);
        }
    }
    Ok(())
}

async fn cmd_chat(engine: &RagEngine) -> Result<()> {
    engine.initialize(false).await.context("failed to initialize the engine")?;

    println!("ragmark interactive mode — type 'exit' or 'quit' to leave\n");
    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline("question> ") {
            Ok(line) => {
                let question = line.trim();
                if question.is_empty() {
                    continue;
                }
                if matches!(question, "exit" | "quit" | "q") {
                    break;
                }
                let _ = editor.add_history_entry(question);

                // Per-question failures are reported and the loop continues.
                match engine.query(question, None).await {
                    Ok(result) => {
                        println!("\n{}", result.answer.trim());
                        if !result.sources.is_empty() {
                            let names: Vec<&str> = result
                                .sources
                                .iter()
                                .map(|s| s.get("source").map(String::as_str).unwrap_or("unknown"))
                                .collect();
                            println!("[sources: {}]\n", names.join(", "));
                        } else {
                            println!();
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "query failed");
                        println!("Error: {e}\n");
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    println!("Goodbye!");
    Ok(())
}

async fn cmd_grade(
    engine: Arc<RagEngine>,
    exam_path: &PathBuf,
    out: Option<PathBuf>,
    report_path: Option<PathBuf>,
) -> Result<()> {
    engine.initialize(false).await.context("failed to initialize the engine")?;

    let file = std::fs::File::open(exam_path)
        .with_context(|| format!("failed to open exam file {}", exam_path.display()))?;
    let items: Vec<ExamItem> = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("invalid exam file {}", exam_path.display()))?;
    info!(items = items.len(), exam = %exam_path.display(), "grading exam");

    // Ctrl-C stops the batch between items.
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let grader = ExamGrader::new(engine);
    let outcome = grader.grade_exam_with(&items, &cancel).await?;

    let out_path = out.unwrap_or_else(|| exam_path.with_extension("results.json"));
    let out_file = std::fs::File::create(&out_path)
        .with_context(|| format!("failed to create {}", out_path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(out_file), &outcome)?;

    println!(
        "Graded {} questions at {}: {}/{} ({:.1}%), {} — results in {}",
        outcome.num_questions,
        chrono::Local::now().format("%Y-%m-%d %H:%M"),
        outcome.total_score,
        outcome.max_score,
        outcome.percentage,
        if outcome.summary.passed { "pass" } else { "fail" },
        out_path.display(),
    );
    if outcome.summary.num_failed > 0 {
        println!("Warning: {} item(s) could not be graded", outcome.summary.num_failed);
    }

    if let Some(report_path) = report_path {
        std::fs::write(&report_path, render_report(&outcome))
            .with_context(|| format!("failed to write {}", report_path.display()))?;
        println!("Report written to {}", report_path.display());
    }
    Ok(())
}

async fn cmd_status(engine: &RagEngine) -> Result<()> {
    // Attach to the store when one exists so the record count is real,
    // but never trigger a build from a status probe.
    if engine.store_exists() {
        if let Err(e) = engine.initialize(false).await {
            warn!(error = %e, "failed to load the store; reporting engine state as-is");
        }
    }
    let status = engine.status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
