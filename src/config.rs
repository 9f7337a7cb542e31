use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use askdoc_core::models::{ChunkMode, ChunkParams};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_mode")]
    pub mode: String,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_max_document_chars")]
    pub max_document_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            mode: default_chunk_mode(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            similarity_threshold: default_similarity_threshold(),
            max_document_chars: default_max_document_chars(),
        }
    }
}

impl ChunkingConfig {
    pub fn to_params(&self) -> Result<ChunkParams> {
        let mode = match self.mode.as_str() {
            "fixed" => ChunkMode::Fixed,
            "semantic" => ChunkMode::Semantic,
            other => anyhow::bail!("Unknown chunking mode: '{}'. Use fixed or semantic.", other),
        };
        let params = ChunkParams {
            mode,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            similarity_threshold: self.similarity_threshold,
            max_document_chars: self.max_document_chars,
        };
        params.validate()?;
        Ok(params)
    }
}

fn default_chunk_mode() -> String {
    "fixed".to_string()
}
fn default_chunk_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_similarity_threshold() -> f32 {
    0.6
}
fn default_max_document_chars() -> usize {
    300_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_reranker_retries")]
    pub max_retries: u32,
    #[serde(default = "default_reranker_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            model: None,
            url: None,
            max_retries: default_reranker_retries(),
            timeout_secs: default_reranker_timeout_secs(),
        }
    }
}

impl RerankerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_reranker_provider() -> String {
    "disabled".to_string()
}
fn default_reranker_retries() -> u32 {
    2
}
fn default_reranker_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_cache_max_bytes")]
    pub max_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            max_bytes: default_cache_max_bytes(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".askdoc/cache")
}
fn default_cache_max_bytes() -> u64 {
    512 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Candidates fetched from the index before reranking.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
    /// Passages kept after reranking.
    #[serde(default = "default_final_n")]
    pub final_n: usize,
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: default_candidate_k(),
            final_n: default_final_n(),
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}

fn default_candidate_k() -> usize {
    8
}
fn default_final_n() -> usize {
    3
}
fn default_build_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Chunking: also checks size/overlap/threshold ranges.
    config.chunking.to_params()?;

    if config.retrieval.final_n < 1 {
        anyhow::bail!("retrieval.final_n must be >= 1");
    }
    if config.retrieval.final_n > config.retrieval.candidate_k {
        anyhow::bail!(
            "retrieval.final_n ({}) must not exceed retrieval.candidate_k ({})",
            config.retrieval.final_n,
            config.retrieval.candidate_k
        );
    }

    match config.embedding.provider.as_str() {
        "hash" | "disabled" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, or disabled.",
            other
        ),
    }

    match config.reranker.provider.as_str() {
        "disabled" => {}
        "http" => {
            if config.reranker.url.is_none() {
                anyhow::bail!("reranker.url must be specified when provider is 'http'");
            }
        }
        other => anyhow::bail!(
            "Unknown reranker provider: '{}'. Must be http or disabled.",
            other
        ),
    }

    if config.cache.max_bytes == 0 {
        anyhow::bail!("cache.max_bytes must be > 0");
    }

    Ok(())
}
