//! # askdoc CLI
//!
//! Command-line front end for the retrieval core. Builds (or loads) a
//! document's vector index and answers queries with the most relevant
//! passages; generation itself is out of scope, so `ask` prints the
//! assembled context a generation step would receive.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `askdoc index <file>` | Build or load the document's vector index |
//! | `askdoc ask <file> "<question>"` | Retrieve and print the most relevant passages |
//! | `askdoc cache stats` | Show cache entry count and size on disk |
//! | `askdoc cache clear` | Delete every cached index |
//!
//! ## Examples
//!
//! ```bash
//! # Index a document (idempotent; second run is a cache hit)
//! askdoc index lease.txt
//!
//! # Ask a question against it
//! askdoc ask lease.txt "When can the landlord raise the rent?"
//!
//! # With a config file
//! askdoc --config askdoc.toml ask lease.txt "What is the notice period?"
//! ```

mod cache;
mod config;
mod context;
mod embedding;
mod rerank;
mod retriever;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::IndexCache;
use crate::config::Config;
use crate::rerank::Reranker;
use crate::retriever::Retriever;

#[derive(Parser)]
#[command(name = "askdoc", about = "Document Q&A retrieval", version)]
struct Cli {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build or load the vector index for a document
    Index {
        /// Path to a plain-text document
        file: PathBuf,
    },
    /// Retrieve the passages most relevant to a question
    Ask {
        /// Path to a plain-text document
        file: PathBuf,
        /// The question to answer from the document
        question: String,
        /// Candidates fetched before reranking (defaults from config)
        #[arg(short)]
        k: Option<usize>,
        /// Passages kept after reranking
        #[arg(short)]
        n: Option<usize>,
    },
    /// Inspect or clear the index cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry count and total size
    Stats,
    /// Delete every cached index
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("askdoc=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Command::Index { file } => cmd_index(&config, &file).await,
        Command::Ask {
            file,
            question,
            k,
            n,
        } => cmd_ask(&config, &file, &question, k, n).await,
        Command::Cache { action } => cmd_cache(&config, action),
    }
}

fn build_retriever(config: &Config) -> Result<Arc<Retriever>> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let reranker = Arc::new(Reranker::new(rerank::create_cross_encoder(
        &config.reranker,
    )?));
    let cache = Arc::new(IndexCache::new(
        config.cache.dir.clone(),
        config.cache.max_bytes,
    ));
    Ok(Arc::new(Retriever::new(
        embedder,
        reranker,
        cache,
        config.chunking.to_params()?,
        Duration::from_secs(config.retrieval.build_timeout_secs),
    )))
}

fn read_document(file: &PathBuf) -> Result<String> {
    std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))
}

async fn cmd_index(config: &Config, file: &PathBuf) -> Result<()> {
    let retriever = build_retriever(config)?;
    let text = read_document(file)?;

    let handle = retriever.spawn_build(text).await??;
    match handle.try_index() {
        Ok(index) => {
            println!("indexed {}", file.display());
            println!("  chunks: {}", index.len());
            println!("  model: {} ({} dims)", index.model_id(), index.dims());
            println!("  key: {}", handle.key());
        }
        Err(_) => {
            println!("{}: document produced no chunks; nothing to index", file.display());
        }
    }
    Ok(())
}

async fn cmd_ask(
    config: &Config,
    file: &PathBuf,
    question: &str,
    k: Option<usize>,
    n: Option<usize>,
) -> Result<()> {
    let retriever = build_retriever(config)?;
    let text = read_document(file)?;
    let k = k.unwrap_or(config.retrieval.candidate_k);
    let n = n.unwrap_or(config.retrieval.final_n);

    let handle = retriever.build_or_load(&text).await?;
    let results = retriever.retrieve_reranked(&handle, question, k, n).await?;

    match context::assemble(&results) {
        Some(ctx) => {
            for (rank, result) in results.iter().enumerate() {
                let score = result.rerank_score.unwrap_or(result.score);
                println!("[{}] chunk {} (score {:.4})", rank + 1, result.seq, score);
            }
            println!();
            println!("{}", ctx);
        }
        None => {
            println!("no relevant context found in the document");
        }
    }
    Ok(())
}

fn cmd_cache(config: &Config, action: CacheAction) -> Result<()> {
    let cache = IndexCache::new(config.cache.dir.clone(), config.cache.max_bytes);
    match action {
        CacheAction::Stats => {
            let stats = cache.stats();
            println!("cache {}", config.cache.dir.display());
            println!("  entries: {}", stats.entries);
            println!("  bytes: {}", stats.total_bytes);
        }
        CacheAction::Clear => {
            cache.clear()?;
            println!("cache cleared");
        }
    }
    Ok(())
}
