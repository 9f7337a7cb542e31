//! In-memory vector index over chunk embeddings.
//!
//! A [`VectorIndex`] owns the chunk texts together with their embedding
//! vectors and answers k-nearest-neighbor queries. Vectors are
//! L2-normalized on insert and queries are normalized on entry, so cosine
//! similarity reduces to a dot product over the scan.
//!
//! At single-document scale (tens to low hundreds of chunks) a
//! brute-force linear scan is faster than any approximate structure and
//! exact by construction. The public surface (`build`/`search`) does not
//! expose the scan, so an ANN backend can replace it later without
//! touching callers.
//!
//! The index is immutable once built and serializable with serde; the
//! cache layer persists it as JSON next to its manifest.

use serde::{Deserialize, Serialize};

use crate::embedding::{dot, l2_normalize};
use crate::error::{Result, RetrievalError};
use crate::models::{Chunk, RankedResult};

/// One indexed chunk: text plus its unit-length embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Immutable k-NN index over a single document's chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    model_id: String,
    dims: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    /// Build an index from parallel chunk/vector sequences.
    ///
    /// Vectors are L2-normalized on insert. Fails if the sequences have
    /// different lengths, a chunk sequence id repeats, or any vector's
    /// dimension disagrees with `dims` — a dimension mismatch is a
    /// configuration error and is never coerced.
    pub fn build(
        model_id: &str,
        dims: usize,
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self> {
        if chunks.len() != vectors.len() {
            return Err(RetrievalError::InvalidParams(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }

        let mut entries = Vec::with_capacity(chunks.len());
        let mut last_seq: Option<usize> = None;
        for (chunk, mut vector) in chunks.into_iter().zip(vectors) {
            if vector.len() != dims {
                return Err(RetrievalError::DimensionMismatch {
                    expected: dims,
                    actual: vector.len(),
                });
            }
            if last_seq.is_some_and(|prev| chunk.seq <= prev) {
                return Err(RetrievalError::InvalidParams(format!(
                    "chunk sequence ids must be strictly increasing (saw {} after {:?})",
                    chunk.seq, last_seq
                )));
            }
            last_seq = Some(chunk.seq);
            l2_normalize(&mut vector);
            entries.push(IndexEntry { chunk, vector });
        }

        Ok(Self {
            model_id: model_id.to_string(),
            dims,
            entries,
        })
    }

    /// Embedding model this index was built under.
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Vector dimensionality shared by every entry.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return up to `k` chunks ordered by descending cosine similarity,
    /// sequence id breaking ties.
    ///
    /// An empty index (or `k == 0`) returns an empty result, not an
    /// error. A query of the wrong dimension fails with
    /// [`RetrievalError::DimensionMismatch`].
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<RankedResult>> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut query = query.to_vec();
        l2_normalize(&mut query);

        let mut results: Vec<RankedResult> = self
            .entries
            .iter()
            .map(|entry| RankedResult {
                seq: entry.chunk.seq,
                text: entry.chunk.text.clone(),
                score: dot(&query, &entry.vector),
                rerank_score: None,
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Consistency check for indexes loaded from disk: every stored
    /// vector must match the declared dimension and stay (close to)
    /// unit length. Used by the cache to reject corrupt entries.
    pub fn validate(&self) -> Result<()> {
        for entry in &self.entries {
            if entry.vector.len() != self.dims {
                return Err(RetrievalError::CacheCorrupt(format!(
                    "entry {} has dimension {}, index declares {}",
                    entry.chunk.seq,
                    entry.vector.len(),
                    self.dims
                )));
            }
            let norm: f32 = entry.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > f32::EPSILON && (norm - 1.0).abs() > 1e-3 {
                return Err(RetrievalError::CacheCorrupt(format!(
                    "entry {} is not unit length (norm {})",
                    entry.chunk.seq, norm
                )));
            }
        }
        Ok(())
    }

    /// Texts of all indexed chunks, in sequence order.
    pub fn chunk_texts(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.chunk.text.as_str())
    }
}
