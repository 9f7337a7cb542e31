//! Retrieval orchestration.
//!
//! The [`Retriever`] ties the pipeline together: on first sight of a
//! document it builds (or loads from cache) the document's
//! [`VectorIndex`]; per query it embeds the question, searches the
//! index, and optionally reranks the candidates.
//!
//! All collaborators — embedder, reranker, cache — are explicit handles
//! injected at construction with process lifetime. Index builds can run
//! inline or as a background task ([`Retriever::spawn_build`]) with a
//! configurable timeout; either way the build suspends only at I/O
//! boundaries (embedding calls, cache disk I/O). A built index is
//! immutable, so queries are plain reads with no locking, and concurrent
//! builds of the same key are harmless: content-derived determinism
//! makes duplicate work equivalent and the cache save is
//! last-writer-wins.

use std::sync::Arc;
use std::time::Duration;

use askdoc_core::chunk::chunk_text;
use askdoc_core::embedding::Embedder;
use askdoc_core::error::Result;
use askdoc_core::index::VectorIndex;
use askdoc_core::models::{content_hash, BuildParams, ChunkParams, RankedResult};
use askdoc_core::RetrievalError;

use crate::cache::IndexCache;
use crate::rerank::Reranker;

/// Handle to a built (possibly empty) index for one document.
///
/// Cloning is cheap; the index itself is shared and immutable.
#[derive(Clone)]
pub struct IndexHandle {
    key: String,
    index: Arc<VectorIndex>,
}

impl IndexHandle {
    /// Cache key identifying this (document, parameters) pair.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    /// True for the terminal "no index" state of a blank document.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.index.len()
    }

    /// The index, or [`RetrievalError::EmptyDocument`] for a document
    /// that yielded no chunks.
    pub fn try_index(&self) -> Result<&VectorIndex> {
        if self.index.is_empty() {
            Err(RetrievalError::EmptyDocument)
        } else {
            Ok(&self.index)
        }
    }
}

/// Cache-aware retrieval front end for single-document Q&A.
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    reranker: Arc<Reranker>,
    cache: Arc<IndexCache>,
    chunking: ChunkParams,
    build_timeout: Duration,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        reranker: Arc<Reranker>,
        cache: Arc<IndexCache>,
        chunking: ChunkParams,
        build_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            reranker,
            cache,
            chunking,
            build_timeout,
        }
    }

    /// Full build identity for the current configuration.
    pub fn build_params(&self) -> BuildParams {
        BuildParams {
            chunking: self.chunking.clone(),
            model_id: self.embedder.model_id().to_string(),
            dims: self.embedder.dims(),
        }
    }

    /// Build the document's index, or load it from cache.
    ///
    /// Idempotent: the same document under the same parameters hits the
    /// cache and costs zero embedding calls. A blank document yields an
    /// empty-index handle — a terminal state, not an error. Cache write
    /// failures are logged and swallowed; the in-memory index is still
    /// returned.
    pub async fn build_or_load(&self, document_text: &str) -> Result<IndexHandle> {
        let params = self.build_params();
        let hash = content_hash(document_text);
        let key = IndexCache::key_for(document_text, &params);

        if let Some(index) = self.cache.load(&key, &hash, &params) {
            tracing::debug!(key, chunks = index.len(), "index cache hit");
            return Ok(IndexHandle {
                key,
                index: Arc::new(index),
            });
        }

        let chunks = chunk_text(document_text, &self.chunking, self.embedder.as_ref()).await?;
        if chunks.is_empty() {
            tracing::info!(key, "document produced no chunks; nothing to index");
            let index = VectorIndex::build(&params.model_id, params.dims, Vec::new(), Vec::new())?;
            return Ok(IndexHandle {
                key,
                index: Arc::new(index),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        let index = VectorIndex::build(&params.model_id, params.dims, chunks, vectors)?;

        tracing::info!(key, chunks = index.len(), "built index");
        if let Err(e) = self.cache.save(&key, &hash, &params, &index) {
            tracing::warn!(key, "failed to persist index, continuing uncached: {}", e);
        }

        Ok(IndexHandle {
            key,
            index: Arc::new(index),
        })
    }

    /// Run [`Retriever::build_or_load`] as a background task bounded by
    /// the configured build timeout, so upload handling is not blocked
    /// for the full build duration.
    ///
    /// Aborting the task (or the timeout firing) cannot corrupt the
    /// cache: an interrupted save only ever leaves a staging directory,
    /// which later loads ignore and the sweep removes.
    pub fn spawn_build(
        self: Arc<Self>,
        document_text: String,
    ) -> tokio::task::JoinHandle<Result<IndexHandle>> {
        let timeout = self.build_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, self.build_or_load(&document_text)).await {
                Ok(result) => result,
                Err(_) => Err(RetrievalError::EmbeddingServiceUnavailable(format!(
                    "index build timed out after {}s",
                    timeout.as_secs()
                ))),
            }
        })
    }

    /// Embed the query and return the `k` most similar chunks.
    ///
    /// An empty index or blank query returns an empty result — the
    /// explicit "no relevant context" condition — never an error.
    pub async fn retrieve(
        &self,
        handle: &IndexHandle,
        query: &str,
        k: usize,
    ) -> Result<Vec<RankedResult>> {
        if handle.is_empty() || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed_one(query).await?;
        handle.index().search(&query_vec, k)
    }

    /// Retrieve `k` candidates and rerank them down to `n`.
    ///
    /// Reranking never fails the request: an unavailable cross-encoder
    /// degrades to similarity order (observable on the reranker handle).
    pub async fn retrieve_reranked(
        &self,
        handle: &IndexHandle,
        query: &str,
        k: usize,
        n: usize,
    ) -> Result<Vec<RankedResult>> {
        let candidates = self.retrieve(handle, query, k).await?;
        Ok(self.reranker.rerank(query, candidates, n.min(k)).await)
    }

    pub fn reranker(&self) -> &Reranker {
        &self.reranker
    }
}
