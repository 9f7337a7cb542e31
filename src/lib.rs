//! # askdoc
//!
//! Retrieval core for single-document question answering: upload a
//! document, ask natural-language questions, and get back the small set
//! of passages most relevant to answering them — grounding generation
//! and bounding how much text is sent to the language model.
//!
//! ## Architecture
//!
//! ```text
//! document text ──▶ Chunker ──▶ Embedder ──▶ VectorIndex ──▶ IndexCache
//!                                                │              (disk)
//!                 query ──▶ Embedder ──▶ search(k)
//!                                                │
//!                                            Reranker (top-n)
//!                                                │
//!                                         context string ──▶ generation
//! ```
//!
//! The index for a `(document, parameters)` pair is built once, persisted
//! under a content-derived key, and reloaded on every later request.
//! Text extraction, prompting, and generation are external collaborators.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding service providers (OpenAI, Ollama, hash) |
//! | [`cache`] | On-disk index cache with LRU eviction |
//! | [`retriever`] | Build-or-load orchestration and per-query search |
//! | [`rerank`] | Cross-encoder reranking with graceful degradation |
//! | [`context`] | Final passage concatenation for the generation step |
//!
//! Chunking, the vector index, and the embedder trait live in the
//! [`askdoc_core`] crate.

pub mod cache;
pub mod config;
pub mod context;
pub mod embedding;
pub mod rerank;
pub mod retriever;

pub use askdoc_core::{self as core, RetrievalError};
