//! Cross-encoder reranking.
//!
//! A second retrieval pass: the top-k candidates from the vector index
//! are rescored jointly against the query by a cross-encoder, and the
//! top-n survive. More accurate than embedding similarity, more
//! expensive, and dependent on an external service — so the [`Reranker`]
//! degrades rather than fails: when the cross-encoder is unavailable it
//! returns the top-n candidates in their original similarity order,
//! emits a `warn!` event, and increments an observable fallback counter.
//! Availability over precision, but never silently.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use askdoc_core::models::RankedResult;
use askdoc_core::RetrievalError;

use crate::config::RerankerConfig;

/// Trait for cross-encoder scoring backends.
///
/// `score` returns one relevance score per passage, in passage order,
/// for the given query. Implementations must be deterministic for a
/// fixed (query, passages, model) triple.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Model identifier, for logging.
    fn model_id(&self) -> &str;

    /// Score each (query, passage) pair.
    async fn score(
        &self,
        query: &str,
        passages: &[String],
    ) -> std::result::Result<Vec<f32>, RetrievalError>;
}

/// Create the configured [`CrossEncoder`], or `None` when reranking is
/// disabled (candidates then pass through in similarity order without
/// counting as fallbacks).
pub fn create_cross_encoder(config: &RerankerConfig) -> Result<Option<Arc<dyn CrossEncoder>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "http" => Ok(Some(Arc::new(HttpCrossEncoder::new(config)?))),
        other => anyhow::bail!("Unknown reranker provider: {}", other),
    }
}

/// Refines top-k candidates to top-n with a cross-encoder.
pub struct Reranker {
    encoder: Option<Arc<dyn CrossEncoder>>,
    fallbacks: AtomicU64,
}

impl Reranker {
    pub fn new(encoder: Option<Arc<dyn CrossEncoder>>) -> Self {
        Self {
            encoder,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// A reranker that always passes candidates through.
    pub fn disabled() -> Self {
        Self::new(None)
    }

    /// Number of times the cross-encoder was unavailable and the
    /// similarity-order fallback was used.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Rescore `candidates` against `query` and keep the best `n`.
    ///
    /// The output is always a subset of the input, most relevant first.
    /// On cross-encoder failure the top-n candidates are returned in
    /// their original similarity order instead.
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<RankedResult>,
        n: usize,
    ) -> Vec<RankedResult> {
        let n = n.min(candidates.len());
        if candidates.is_empty() || n == 0 {
            candidates.truncate(n);
            return candidates;
        }

        let encoder = match &self.encoder {
            Some(encoder) => encoder,
            None => {
                candidates.truncate(n);
                return candidates;
            }
        };

        let passages: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();
        match encoder.score(query, &passages).await {
            Ok(scores) if scores.len() == candidates.len() => {
                for (candidate, score) in candidates.iter_mut().zip(scores) {
                    candidate.rerank_score = Some(score);
                }
                // Stable sort: ties keep their similarity order.
                candidates.sort_by(|a, b| {
                    b.rerank_score
                        .partial_cmp(&a.rerank_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                candidates.truncate(n);
                candidates
            }
            Ok(scores) => {
                self.record_fallback(&format!(
                    "cross-encoder '{}' returned {} scores for {} passages",
                    encoder.model_id(),
                    scores.len(),
                    candidates.len()
                ));
                candidates.truncate(n);
                candidates
            }
            Err(e) => {
                self.record_fallback(&format!("cross-encoder unavailable: {}", e));
                candidates.truncate(n);
                candidates
            }
        }
    }

    fn record_fallback(&self, reason: &str) {
        self.fallbacks.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            fallbacks = self.fallback_count(),
            "{}; returning candidates in similarity order",
            reason
        );
    }
}

/// Cross-encoder backend speaking the text-embeddings-inference `/rerank`
/// protocol: `POST {url}/rerank {"query", "texts"}` returning
/// `[{"index", "score"}, …]`.
pub struct HttpCrossEncoder {
    model: String,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpCrossEncoder {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("reranker.url required for http provider"))?;
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "cross-encoder".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model,
            url,
            client,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl CrossEncoder for HttpCrossEncoder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn score(
        &self,
        query: &str,
        passages: &[String],
    ) -> std::result::Result<Vec<f32>, RetrievalError> {
        let body = serde_json::json!({
            "query": query,
            "texts": passages,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(format!("{}/rerank", self.url))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RetrievalError::RerankerUnavailable(format!(
                                "rerank response was not JSON: {}",
                                e
                            ))
                        })?;
                        return parse_rerank_response(&json, passages.len());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("rerank API error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(RetrievalError::RerankerUnavailable(format!(
                        "rerank API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RetrievalError::RerankerUnavailable(
            last_err.unwrap_or_else(|| "rerank failed after retries".to_string()),
        ))
    }
}

/// Parse a `/rerank` response into per-passage scores, passage order.
fn parse_rerank_response(
    json: &serde_json::Value,
    expected: usize,
) -> std::result::Result<Vec<f32>, RetrievalError> {
    let items = json.as_array().ok_or_else(|| {
        RetrievalError::RerankerUnavailable("invalid rerank response: not an array".to_string())
    })?;

    let mut scores = vec![None; expected];
    for item in items {
        let index = item.get("index").and_then(|i| i.as_u64()).ok_or_else(|| {
            RetrievalError::RerankerUnavailable("invalid rerank response: missing index".to_string())
        })? as usize;
        let score = item.get("score").and_then(|s| s.as_f64()).ok_or_else(|| {
            RetrievalError::RerankerUnavailable("invalid rerank response: missing score".to_string())
        })? as f32;
        if index >= expected {
            return Err(RetrievalError::RerankerUnavailable(format!(
                "invalid rerank response: index {} out of range",
                index
            )));
        }
        scores[index] = Some(score);
    }

    scores
        .into_iter()
        .enumerate()
        .map(|(i, s)| {
            s.ok_or_else(|| {
                RetrievalError::RerankerUnavailable(format!(
                    "invalid rerank response: no score for passage {}",
                    i
                ))
            })
        })
        .collect()
}
