//! Embedding service providers.
//!
//! Concrete implementations of the core [`Embedder`] trait:
//! - **[`HashingEmbedder`]** (re-export) — deterministic offline bag-of-tokens
//!   embedding; the default provider, used when no service is configured.
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API with batching,
//!   retry, and backoff.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed`
//!   endpoint.
//! - **[`DisabledEmbedder`]** — always fails; used to make an accidental
//!   dependency on embeddings explicit.
//!
//! # Retry Strategy
//!
//! The network providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! All failures surface as [`RetrievalError::EmbeddingServiceUnavailable`]
//! so callers never mistake a service outage for "no relevant passages".

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use askdoc_core::embedding::Embedder;
pub use askdoc_core::embedding::HashingEmbedder;
use askdoc_core::RetrievalError;

use crate::config::EmbeddingConfig;

/// Create the appropriate [`Embedder`] based on configuration.
///
/// | Config value | Provider |
/// |--------------|----------|
/// | `"hash"` | [`HashingEmbedder`] (offline, deterministic) |
/// | `"openai"` | [`OpenAiEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"disabled"` | [`DisabledEmbedder`] |
///
/// # Errors
///
/// Returns an error for unknown provider names or if the provider cannot
/// be initialized (missing model/dims config or API key).
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "hash" => {
            let dims = config.dims.unwrap_or(HashingEmbedder::DEFAULT_DIMS);
            Ok(Arc::new(HashingEmbedder::new(dims)))
        }
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        other => anyhow::bail!("Unknown embedding provider: {}", other),
    }
}

/// A no-op embedder that always returns errors.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_id(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed_batch(
        &self,
        _texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
        Err(RetrievalError::EmbeddingServiceUnavailable(
            "embedding provider is disabled".to_string(),
        ))
    }
}

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Reads
/// `OPENAI_API_KEY` once at construction.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    api_key: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            api_key,
            client,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    async fn embed_one_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RetrievalError::EmbeddingServiceUnavailable(format!(
                                "OpenAI response was not JSON: {}",
                                e
                            ))
                        })?;
                        return parse_openai_response(&json, texts.len());
                    }

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429): don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RetrievalError::EmbeddingServiceUnavailable(
            last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            embeddings.extend(self.embed_one_batch(batch).await?);
        }
        Ok(embeddings)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays in order.
fn parse_openai_response(
    json: &serde_json::Value,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        RetrievalError::EmbeddingServiceUnavailable(
            "invalid OpenAI response: missing data array".to_string(),
        )
    })?;

    if data.len() != expected {
        return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
            "invalid OpenAI response: expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RetrievalError::EmbeddingServiceUnavailable(
                    "invalid OpenAI response: missing embedding".to_string(),
                )
            })?;

        let vec: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push(vec);
    }

    Ok(embeddings)
}

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default
/// `http://localhost:11434`). Requires an embedding model to be pulled
/// (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    batch_size: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for Ollama provider"))?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            dims,
            url,
            client,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
        })
    }

    async fn embed_one_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/api/embed", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RetrievalError::EmbeddingServiceUnavailable(format!(
                                "Ollama response was not JSON: {}",
                                e
                            ))
                        })?;
                        return parse_ollama_response(&json, texts.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ));
                    continue;
                }
            }
        }

        Err(RetrievalError::EmbeddingServiceUnavailable(
            last_err.unwrap_or_else(|| "Ollama embedding failed after retries".to_string()),
        ))
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(
        &self,
        texts: &[String],
    ) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size.max(1)) {
            embeddings.extend(self.embed_one_batch(batch).await?);
        }
        Ok(embeddings)
    }
}

fn parse_ollama_response(
    json: &serde_json::Value,
    expected: usize,
) -> std::result::Result<Vec<Vec<f32>>, RetrievalError> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            RetrievalError::EmbeddingServiceUnavailable(
                "invalid Ollama response: missing embeddings array".to_string(),
            )
        })?;

    if embeddings.len() != expected {
        return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
            "invalid Ollama response: expected {} embeddings, got {}",
            expected,
            embeddings.len()
        )));
    }

    let mut result = Vec::with_capacity(embeddings.len());
    for embedding in embeddings {
        let vec: Vec<f32> = embedding
            .as_array()
            .ok_or_else(|| {
                RetrievalError::EmbeddingServiceUnavailable(
                    "invalid Ollama response: embedding is not an array".to_string(),
                )
            })?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        result.push(vec);
    }

    Ok(result)
}
