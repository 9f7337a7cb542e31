//! Embedder trait and vector math.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! pure similarity/normalization helpers, and [`HashingEmbedder`], a
//! deterministic offline backend.
//!
//! Network-backed implementations (OpenAI, Ollama) live in the `askdoc`
//! app crate.

use async_trait::async_trait;
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::error::{Result, RetrievalError};

/// Trait for embedding backends.
///
/// Implementations must be effectively idempotent (same text → same
/// vector) and return one fixed-dimension vector per input, in input
/// order. Transport or malformed-response failures surface as
/// [`RetrievalError::EmbeddingServiceUnavailable`] — callers must never
/// mistake an embedding failure for "no relevant passages".
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`). Changing the
    /// model invalidates every cached index built under the old one.
    fn model_id(&self) -> &str;

    /// Embedding vector dimensionality, fixed per model id.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, returning equal-order vectors.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vecs = self.embed_batch(&[text.to_string()]).await?;
        if vecs.len() != 1 {
            return Err(RetrievalError::EmbeddingServiceUnavailable(format!(
                "expected 1 embedding, got {}",
                vecs.len()
            )));
        }
        Ok(vecs.remove(0))
    }
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of two equal-length vectors.
///
/// On unit vectors this equals cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Deterministic bag-of-tokens embedder.
///
/// Lowercased alphanumeric tokens are hashed into `dims` buckets; each
/// occurrence increments its bucket. No network, no model download:
/// texts sharing vocabulary land near each other, which is enough for
/// offline operation and for exercising the full pipeline in tests.
pub struct HashingEmbedder {
    model_id: String,
    dims: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self {
            model_id: format!("token-hash-{}", dims),
            dims,
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in tokenize(text) {
            v[bucket(token, self.dims)] += 1.0;
        }
        v
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMS)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Lowercased alphanumeric token runs.
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Map a token to a bucket with a fixed-seed xxHash.
fn bucket(token: String, dims: usize) -> usize {
    let mut h = XxHash64::with_seed(0);
    h.write(token.as_bytes());
    (h.finish() % dims as u64) as usize
}
