//! On-disk cache of built vector indexes.
//!
//! One cache entry per `(document content, build parameters)` pair, keyed
//! by a SHA-256 over the document bytes and every build parameter, so
//! different documents or different configurations never share an index.
//!
//! # Layout
//!
//! ```text
//! <cache root>/
//!   <key>/
//!     manifest.json   — content hash, build params, access timestamps
//!     index.json      — the serialized VectorIndex
//!   .tmp-<key>-<pid>/ — staging dir for an in-flight save
//! ```
//!
//! Saves are staged in a temp directory and renamed into place, so a
//! crashed or cancelled build can only leave a `.tmp-` directory behind —
//! never a half-written entry under a live key. Loads treat anything
//! unreadable, unparsable, or mismatched as a miss: the entry is deleted,
//! a warning is logged, and the caller rebuilds. A corrupt index is never
//! surfaced.
//!
//! Growth is bounded by `max_bytes`: after every save, entries are
//! evicted least-recently-accessed first (the manifest's `last_accessed`
//! field, refreshed on every hit) until the total size fits. Stale
//! staging directories are removed by the same sweep.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use askdoc_core::index::VectorIndex;
use askdoc_core::models::BuildParams;

const MANIFEST_FILE: &str = "manifest.json";
const INDEX_FILE: &str = "index.json";

/// Staging dirs older than this are assumed abandoned and swept.
const STALE_TMP: Duration = Duration::from_secs(3600);

/// Build provenance stored next to each persisted index.
///
/// An entry is only reused when every field here matches the current
/// request; anything else is a miss that triggers a rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub content_hash: String,
    pub model_id: String,
    pub dims: usize,
    pub mode: String,
    pub chunk_size: usize,
    pub overlap: usize,
    pub similarity_threshold: f32,
    pub max_document_chars: usize,
    pub chunk_count: usize,
    pub created_at: i64,
    pub last_accessed: i64,
}

impl Manifest {
    fn for_build(content_hash: &str, params: &BuildParams, chunk_count: usize) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            content_hash: content_hash.to_string(),
            model_id: params.model_id.clone(),
            dims: params.dims,
            mode: params.chunking.mode.as_str().to_string(),
            chunk_size: params.chunking.chunk_size,
            overlap: params.chunking.overlap,
            similarity_threshold: params.chunking.similarity_threshold,
            max_document_chars: params.chunking.max_document_chars,
            chunk_count,
            created_at: now,
            last_accessed: now,
        }
    }

    fn matches(&self, content_hash: &str, params: &BuildParams) -> bool {
        self.content_hash == content_hash
            && self.model_id == params.model_id
            && self.dims == params.dims
            && self.mode == params.chunking.mode.as_str()
            && self.chunk_size == params.chunking.chunk_size
            && self.overlap == params.chunking.overlap
            && self.similarity_threshold == params.chunking.similarity_threshold
            && self.max_document_chars == params.chunking.max_document_chars
    }
}

/// Cache statistics for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
}

/// Handle to the on-disk index cache. Cheap to clone paths from;
/// constructed once at startup and injected into the retriever.
pub struct IndexCache {
    root: PathBuf,
    max_bytes: u64,
}

impl IndexCache {
    pub fn new(root: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    /// Deterministic cache key over the document bytes and every build
    /// parameter. Any difference in content, chunking, or embedding
    /// model yields a different key.
    pub fn key_for(document_text: &str, params: &BuildParams) -> String {
        let mut hasher = Sha256::new();
        hasher.update(document_text.as_bytes());
        hasher.update([0u8]);
        hasher.update(params.model_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(params.dims.to_le_bytes());
        hasher.update(params.chunking.mode.as_str().as_bytes());
        hasher.update(params.chunking.chunk_size.to_le_bytes());
        hasher.update(params.chunking.overlap.to_le_bytes());
        hasher.update(params.chunking.similarity_threshold.to_bits().to_le_bytes());
        hasher.update(params.chunking.max_document_chars.to_le_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Load a persisted index, or signal a miss with `None`.
    ///
    /// Any failure — missing files, parse errors, a manifest that does
    /// not match the requested content/parameters, an index that fails
    /// validation — deletes the entry and reports a miss so the caller
    /// rebuilds. On a hit the manifest's `last_accessed` is refreshed.
    pub fn load(
        &self,
        key: &str,
        content_hash: &str,
        params: &BuildParams,
    ) -> Option<VectorIndex> {
        let dir = self.entry_dir(key);
        if !dir.is_dir() {
            return None;
        }

        let mut manifest = match read_manifest(&dir) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(key, "discarding corrupt cache entry: {}", e);
                let _ = fs::remove_dir_all(&dir);
                return None;
            }
        };

        if !manifest.matches(content_hash, params) {
            tracing::warn!(key, "cache entry does not match requested build, discarding");
            let _ = fs::remove_dir_all(&dir);
            return None;
        }

        let index = match read_index(&dir) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(key, "discarding corrupt cache entry: {}", e);
                let _ = fs::remove_dir_all(&dir);
                return None;
            }
        };

        if index.model_id() != params.model_id
            || index.dims() != params.dims
            || index.len() != manifest.chunk_count
        {
            tracing::warn!(key, "cache entry disagrees with its manifest, discarding");
            let _ = fs::remove_dir_all(&dir);
            return None;
        }
        if let Err(e) = index.validate() {
            tracing::warn!(key, "discarding corrupt cache entry: {}", e);
            let _ = fs::remove_dir_all(&dir);
            return None;
        }

        // Refresh LRU state; failure here is harmless.
        manifest.last_accessed = chrono::Utc::now().timestamp();
        let _ = write_json(&dir.join(MANIFEST_FILE), &manifest);

        Some(index)
    }

    /// Persist a built index under `key`.
    ///
    /// The entry is staged in a temp directory and renamed into place;
    /// concurrent saves of the same key are last-writer-wins safe. A
    /// budget sweep runs afterwards.
    pub fn save(
        &self,
        key: &str,
        content_hash: &str,
        params: &BuildParams,
        index: &VectorIndex,
    ) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create cache dir: {}", self.root.display()))?;

        let stage = self
            .root
            .join(format!(".tmp-{}-{}", key, std::process::id()));
        if stage.exists() {
            fs::remove_dir_all(&stage).ok();
        }
        fs::create_dir_all(&stage)?;

        let manifest = Manifest::for_build(content_hash, params, index.len());
        write_json(&stage.join(MANIFEST_FILE), &manifest)?;
        write_json(&stage.join(INDEX_FILE), index)?;

        let dest = self.entry_dir(key);
        if dest.exists() {
            fs::remove_dir_all(&dest).ok();
        }
        if let Err(e) = fs::rename(&stage, &dest) {
            // Lost a save race; the other writer's entry is equivalent.
            fs::remove_dir_all(&stage).ok();
            tracing::debug!(key, "cache save superseded by concurrent writer: {}", e);
        }

        self.sweep();
        Ok(())
    }

    /// Entry count and total size on disk.
    pub fn stats(&self) -> CacheStats {
        let mut entries = 0;
        let mut total_bytes = 0;
        for entry in self.entries() {
            entries += 1;
            total_bytes += entry.size;
        }
        CacheStats {
            entries,
            total_bytes,
        }
    }

    /// Remove every cache entry.
    pub fn clear(&self) -> Result<()> {
        if self.root.is_dir() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Failed to clear cache: {}", self.root.display()))?;
        }
        Ok(())
    }

    /// Enforce the disk budget (LRU by last access) and drop abandoned
    /// staging directories.
    pub fn sweep(&self) {
        self.remove_stale_staging();

        let mut entries = self.entries();
        let mut total: u64 = entries.iter().map(|e| e.size).sum();
        if total <= self.max_bytes {
            return;
        }

        entries.sort_by_key(|e| e.last_accessed);
        for entry in entries {
            if total <= self.max_bytes {
                break;
            }
            tracing::warn!(
                path = %entry.path.display(),
                "evicting least-recently-used cache entry ({} bytes)",
                entry.size
            );
            if fs::remove_dir_all(&entry.path).is_ok() {
                total = total.saturating_sub(entry.size);
            }
        }
    }

    fn remove_stale_staging(&self) {
        let Ok(read) = fs::read_dir(&self.root) else {
            return;
        };
        for entry in read.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(".tmp-") {
                continue;
            }
            let stale = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|t| t.elapsed().ok())
                .is_some_and(|age| age > STALE_TMP);
            if stale {
                let _ = fs::remove_dir_all(entry.path());
            }
        }
    }

    fn entries(&self) -> Vec<EntryInfo> {
        let Ok(read) = fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for entry in read.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if entry
                .file_name()
                .to_str()
                .is_some_and(|n| n.starts_with(".tmp-"))
            {
                continue;
            }
            let last_accessed = read_manifest(&path).map(|m| m.last_accessed).unwrap_or(0);
            out.push(EntryInfo {
                size: dir_size(&path),
                last_accessed,
                path,
            });
        }
        out
    }
}

struct EntryInfo {
    path: PathBuf,
    size: u64,
    last_accessed: i64,
}

fn read_manifest(dir: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(dir.join(MANIFEST_FILE)).context("manifest unreadable")?;
    serde_json::from_str(&raw).context("manifest unparsable")
}

fn read_index(dir: &Path) -> Result<VectorIndex> {
    let raw = fs::read_to_string(dir.join(INDEX_FILE)).context("index unreadable")?;
    serde_json::from_str(&raw).context("index unparsable")
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    fs::write(path, raw).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

fn dir_size(dir: &Path) -> u64 {
    let Ok(read) = fs::read_dir(dir) else { return 0 };
    read.flatten()
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use askdoc_core::models::{Chunk, ChunkMode, ChunkParams};
    use tempfile::TempDir;

    fn params() -> BuildParams {
        BuildParams {
            chunking: ChunkParams::default(),
            model_id: "token-hash-4".to_string(),
            dims: 4,
        }
    }

    fn small_index() -> VectorIndex {
        VectorIndex::build(
            "token-hash-4",
            4,
            vec![Chunk::new(0, "alpha"), Chunk::new(1, "beta")],
            vec![vec![1.0, 0.0, 0.0, 0.0], vec![0.0, 1.0, 0.0, 0.0]],
        )
        .unwrap()
    }

    #[test]
    fn test_key_deterministic() {
        let p = params();
        assert_eq!(
            IndexCache::key_for("document text", &p),
            IndexCache::key_for("document text", &p)
        );
    }

    #[test]
    fn test_key_changes_with_every_parameter() {
        let base = params();
        let base_key = IndexCache::key_for("doc", &base);

        let mut other = base.clone();
        other.chunking.chunk_size = 500;
        assert_ne!(base_key, IndexCache::key_for("doc", &other));

        let mut other = base.clone();
        other.chunking.overlap = 50;
        assert_ne!(base_key, IndexCache::key_for("doc", &other));

        let mut other = base.clone();
        other.chunking.mode = ChunkMode::Semantic;
        assert_ne!(base_key, IndexCache::key_for("doc", &other));

        let mut other = base.clone();
        other.model_id = "another-model".to_string();
        assert_ne!(base_key, IndexCache::key_for("doc", &other));

        let mut other = base.clone();
        other.dims = 8;
        assert_ne!(base_key, IndexCache::key_for("doc", &other));

        assert_ne!(base_key, IndexCache::key_for("doc two", &base));
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        let p = params();
        let hash = askdoc_core::models::content_hash("doc");
        let key = IndexCache::key_for("doc", &p);

        cache.save(&key, &hash, &p, &small_index()).unwrap();
        let loaded = cache.load(&key, &hash, &p).expect("expected cache hit");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.model_id(), "token-hash-4");
    }

    #[test]
    fn test_load_misses_on_unknown_key() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        assert!(cache.load("nope", "hash", &params()).is_none());
    }

    #[test]
    fn test_load_misses_on_parameter_drift() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        let p = params();
        let hash = askdoc_core::models::content_hash("doc");
        let key = IndexCache::key_for("doc", &p);
        cache.save(&key, &hash, &p, &small_index()).unwrap();

        let mut drifted = p.clone();
        drifted.chunking.chunk_size = 123;
        assert!(cache.load(&key, &hash, &drifted).is_none());
        // The mismatched entry was discarded.
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_corrupt_index_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        let p = params();
        let hash = askdoc_core::models::content_hash("doc");
        let key = IndexCache::key_for("doc", &p);
        cache.save(&key, &hash, &p, &small_index()).unwrap();

        // Simulate a partial write.
        let index_path = tmp.path().join("cache").join(&key).join(INDEX_FILE);
        fs::write(&index_path, "{\"model_id\": \"token-ha").unwrap();

        assert!(cache.load(&key, &hash, &p).is_none());
        assert_eq!(cache.stats().entries, 0);

        // A rebuild repopulates the entry.
        cache.save(&key, &hash, &p, &small_index()).unwrap();
        assert!(cache.load(&key, &hash, &p).is_some());
    }

    #[test]
    fn test_missing_manifest_is_a_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        let p = params();
        let hash = askdoc_core::models::content_hash("doc");
        let key = IndexCache::key_for("doc", &p);
        cache.save(&key, &hash, &p, &small_index()).unwrap();

        fs::remove_file(tmp.path().join("cache").join(&key).join(MANIFEST_FILE)).unwrap();
        assert!(cache.load(&key, &hash, &p).is_none());
    }

    #[test]
    fn test_eviction_respects_budget() {
        let tmp = TempDir::new().unwrap();
        // Budget fits roughly one entry.
        let cache = IndexCache::new(tmp.path().join("cache"), 600);
        let p = params();

        let hash_a = askdoc_core::models::content_hash("doc a");
        let key_a = IndexCache::key_for("doc a", &p);
        cache.save(&key_a, &hash_a, &p, &small_index()).unwrap();

        let hash_b = askdoc_core::models::content_hash("doc b");
        let key_b = IndexCache::key_for("doc b", &p);
        cache.save(&key_b, &hash_b, &p, &small_index()).unwrap();

        let stats = cache.stats();
        assert!(stats.total_bytes <= 600, "budget exceeded: {:?}", stats);
        assert!(stats.entries < 2);
    }

    #[test]
    fn test_clear_and_stats() {
        let tmp = TempDir::new().unwrap();
        let cache = IndexCache::new(tmp.path().join("cache"), u64::MAX);
        let p = params();
        let hash = askdoc_core::models::content_hash("doc");
        let key = IndexCache::key_for("doc", &p);
        cache.save(&key, &hash, &p, &small_index()).unwrap();

        assert_eq!(cache.stats().entries, 1);
        assert!(cache.stats().total_bytes > 0);

        cache.clear().unwrap();
        assert_eq!(cache.stats().entries, 0);
        assert!(cache.load(&key, &hash, &p).is_none());
    }
}
