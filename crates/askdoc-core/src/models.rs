//! Core data models used throughout askdoc.
//!
//! These types represent the chunks, build parameters, and ranked results
//! that flow through the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A bounded span of document text; the retrieval unit.
///
/// Sequence ids are contiguous and unique within one index: `0, 1, …, N-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub seq: usize,
    pub text: String,
}

impl Chunk {
    pub fn new(seq: usize, text: impl Into<String>) -> Self {
        Self {
            seq,
            text: text.into(),
        }
    }
}

/// How document text is split into chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMode {
    /// Fixed-size window sliding by `chunk_size - overlap`, cut points
    /// snapped to sentence/paragraph boundaries when one is nearby.
    Fixed,
    /// Variable-length chunks cut where adjacent-sentence embedding
    /// similarity drops below a threshold. Costs embedding calls during
    /// chunking.
    Semantic,
}

impl ChunkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkMode::Fixed => "fixed",
            ChunkMode::Semantic => "semantic",
        }
    }
}

/// Chunking parameters. Part of the cache identity: any change here
/// invalidates previously built indexes for the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkParams {
    pub mode: ChunkMode,
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters carried over between consecutive fixed-mode chunks.
    pub overlap: usize,
    /// Topic-shift cut threshold for semantic mode, in `[0.0, 1.0]`.
    pub similarity_threshold: f32,
    /// Documents are truncated to this many characters before chunking.
    pub max_document_chars: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            mode: ChunkMode::Fixed,
            chunk_size: 1000,
            overlap: 200,
            similarity_threshold: 0.6,
            max_document_chars: 300_000,
        }
    }
}

impl ChunkParams {
    /// Reject parameter combinations that cannot make progress.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_size == 0 {
            return Err(crate::RetrievalError::InvalidParams(
                "chunk_size must be > 0".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(crate::RetrievalError::InvalidParams(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(crate::RetrievalError::InvalidParams(
                "similarity_threshold must be in [0.0, 1.0]".into(),
            ));
        }
        Ok(())
    }
}

/// Everything that determines the shape of a built index: chunking
/// parameters plus the embedding model identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildParams {
    pub chunking: ChunkParams,
    pub model_id: String,
    pub dims: usize,
}

/// A retrieved chunk with its similarity score, and the cross-encoder
/// score once reranked.
#[derive(Debug, Clone, Serialize)]
pub struct RankedResult {
    pub seq: usize,
    pub text: String,
    /// Cosine similarity to the query, in `[-1.0, 1.0]`.
    pub score: f32,
    /// Cross-encoder relevance, populated by the reranker.
    pub rerank_score: Option<f32>,
}

/// SHA-256 of the document bytes; the cache identity of a document.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(content_hash("hello"), content_hash("hello"));
        assert_ne!(content_hash("hello"), content_hash("hello "));
    }

    #[test]
    fn test_params_validate() {
        assert!(ChunkParams::default().validate().is_ok());

        let zero = ChunkParams {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let bad_overlap = ChunkParams {
            chunk_size: 100,
            overlap: 100,
            ..Default::default()
        };
        assert!(bad_overlap.validate().is_err());

        let bad_threshold = ChunkParams {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());
    }
}
