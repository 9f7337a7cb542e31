//! Error taxonomy for the retrieval pipeline.
//!
//! Callers are expected to treat the variants differently: an unavailable
//! embedding service must never be conflated with "no relevant passages",
//! cache corruption is recovered internally via rebuild, and a dimension
//! mismatch is a configuration error that is never silently coerced.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The document yielded zero chunks. A terminal "no index" state,
    /// not a failure: retrieval over it returns empty results.
    #[error("document produced no chunks")]
    EmptyDocument,

    /// The embedding service could not be reached or returned a malformed
    /// response after retries were exhausted.
    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),

    /// The cross-encoder could not be reached or returned a malformed
    /// response. The reranker degrades to similarity order on this.
    #[error("cross-encoder unavailable: {0}")]
    RerankerUnavailable(String),

    /// A persisted index entry failed to load or validate. Treated as a
    /// cache miss by the cache layer, never surfaced to retrieval.
    #[error("cache entry corrupt: {0}")]
    CacheCorrupt(String),

    /// A vector's dimension disagrees with the index dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Build parameters that cannot produce a valid index.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
