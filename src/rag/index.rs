//! Incremental vector index with per-file deduplication.
//!
//! Ingestion is serialized by an internal lock; queries only take a short
//! read lock on the collection handle and run alongside ingestion. The
//! indexed-file manifest is written strictly after the collection commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::chunk::{Chunk, ChunkKind, RetrievalResult};
use super::manifest::IndexedFileSet;
use super::sqlite::SqliteChunkStore;
use super::store::ChunkStore;
use crate::core::config::IndexConfig;
use crate::core::errors::{GatewayError, RagError};
use crate::core::persist::remove_file_if_exists;
use crate::gateway::Gateway;

const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    Uninitialized,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    pub vector_count: usize,
    pub indexed_file_count: usize,
    pub indexed_files: Vec<String>,
    pub collection_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct VectorIndex {
    dir: PathBuf,
    config: IndexConfig,
    gateway: Arc<dyn Gateway>,
    store: RwLock<Option<Arc<dyn ChunkStore>>>,
    files: std::sync::RwLock<IndexedFileSet>,
    ingest_lock: Mutex<()>,
    open_error: std::sync::RwLock<Option<String>>,
}

impl VectorIndex {
    /// Opens the index rooted at `dir`, reopening a collection left by a
    /// previous run.
    pub async fn open(
        dir: impl Into<PathBuf>,
        config: IndexConfig,
        gateway: Arc<dyn Gateway>,
    ) -> Result<Self, RagError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RagError::storage)?;

        let files = match IndexedFileSet::load(&dir).await {
            Ok(files) => files,
            Err(err) => {
                warn!(error = %err, "Indexed file manifest unreadable, starting with an empty set");
                IndexedFileSet::default()
            }
        };

        let mut store: Option<Arc<dyn ChunkStore>> = None;
        let mut open_error = None;
        let collection = SqliteChunkStore::collection_files(&dir)[0].clone();
        if collection.exists() {
            match SqliteChunkStore::open(&dir).await {
                Ok(existing) => {
                    info!(dir = %dir.display(), "Reopened existing vector collection");
                    store = Some(Arc::new(existing));
                }
                Err(err) => {
                    warn!(error = %err, "Failed to reopen vector collection");
                    open_error = Some(err.to_string());
                }
            }
        }

        Ok(Self {
            dir,
            config,
            gateway,
            store: RwLock::new(store),
            files: std::sync::RwLock::new(files),
            ingest_lock: Mutex::new(()),
            open_error: std::sync::RwLock::new(open_error),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_k(&self) -> usize {
        self.config.retrieval_k
    }

    /// Embeds and stores every chunk from files not yet indexed. Returns the
    /// number of vectors actually added.
    pub async fn ingest(&self, chunks: Vec<Chunk>) -> Result<usize, RagError> {
        let _guard = self.ingest_lock.lock().await;

        if chunks.is_empty() {
            return Ok(0);
        }

        let received = chunks.len();
        let pending = self.select_new_chunks(chunks);
        if pending.is_empty() {
            info!(received, "Nothing new to ingest");
            return Ok(0);
        }

        let mut new_files: Vec<String> = pending
            .iter()
            .filter(|c| !c.origin_file.is_empty())
            .map(|c| c.origin_file.clone())
            .collect();
        new_files.sort();
        new_files.dedup();

        let embeddings = self.embed_all(&pending).await?;
        let store = self.ensure_store().await?;
        let added = store
            .insert_batch(pending.into_iter().zip(embeddings).collect())
            .await?;

        // Vectors are durable from here; only now may the files be recorded.
        let next = {
            let files = self.read_files();
            files.union(new_files.iter().map(String::as_str))
        };
        next.save(&self.dir).await?;
        *self.files.write().unwrap_or_else(|e| e.into_inner()) = next;

        info!(received, added, files = new_files.len(), "Ingested chunks");
        Ok(added)
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<RetrievalResult, RagError> {
        self.search(text, k, None).await
    }

    pub async fn query_by_kind(
        &self,
        text: &str,
        kind: ChunkKind,
        k: usize,
    ) -> Result<RetrievalResult, RagError> {
        self.search(text, k, Some(kind)).await
    }

    pub fn is_indexed(&self, origin_file: &str) -> bool {
        self.read_files().contains(origin_file)
    }

    pub fn indexed_files(&self) -> Vec<String> {
        self.read_files().sorted()
    }

    pub async fn is_ready(&self) -> bool {
        self.store.read().await.is_some()
    }

    pub async fn stats(&self) -> IndexStats {
        let files = self.read_files().sorted();
        let store = self.store.read().await.clone();
        let open_error = self
            .open_error
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let (status, vector_count, error) = match (store, open_error) {
            (Some(store), _) => match store.count().await {
                Ok(count) => (IndexStatus::Ready, count, None),
                Err(err) => (IndexStatus::Error, 0, Some(err.to_string())),
            },
            (None, Some(err)) => (IndexStatus::Error, 0, Some(err)),
            (None, None) => (IndexStatus::Uninitialized, 0, None),
        };

        IndexStats {
            status,
            vector_count,
            indexed_file_count: files.len(),
            indexed_files: files,
            collection_dir: self.dir.display().to_string(),
            error,
        }
    }

    /// Deletes the collection and the manifest. Waits for any running ingest.
    pub async fn reset(&self) -> Result<(), RagError> {
        let _guard = self.ingest_lock.lock().await;

        let previous = self.store.write().await.take();
        if let Some(store) = previous {
            store.close().await;
        }

        for path in SqliteChunkStore::collection_files(&self.dir) {
            remove_file_if_exists(&path).await?;
        }
        IndexedFileSet::remove(&self.dir).await?;

        *self.files.write().unwrap_or_else(|e| e.into_inner()) = IndexedFileSet::default();
        *self.open_error.write().unwrap_or_else(|e| e.into_inner()) = None;

        info!(dir = %self.dir.display(), "Vector index reset");
        Ok(())
    }

    async fn search(
        &self,
        text: &str,
        k: usize,
        kind: Option<ChunkKind>,
    ) -> Result<RetrievalResult, RagError> {
        let store = self
            .store
            .read()
            .await
            .clone()
            .ok_or(RagError::NotInitialized)?;

        if k == 0 || text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let embedding = self.gateway.embed(text).await?;
        let results = store.search(&embedding, k, kind).await?;
        debug!(k, hits = results.len(), "Similarity search finished");
        Ok(results)
    }

    fn select_new_chunks(&self, chunks: Vec<Chunk>) -> Vec<Chunk> {
        let files = self.read_files();
        let min_chars = self.config.min_chunk_chars;
        let mut already_indexed = 0usize;
        let mut noise = 0usize;

        let selected: Vec<Chunk> = chunks
            .into_iter()
            .filter(|chunk| {
                if !chunk.origin_file.is_empty() && files.contains(&chunk.origin_file) {
                    already_indexed += 1;
                    return false;
                }
                if chunk.content.trim().chars().count() < min_chars {
                    noise += 1;
                    return false;
                }
                true
            })
            .map(|mut chunk| {
                if chunk.source_id.trim().is_empty() {
                    chunk.source_id = UNKNOWN_SOURCE.to_string();
                }
                chunk
            })
            .collect();

        if already_indexed > 0 || noise > 0 {
            debug!(already_indexed, noise, "Skipped chunks during ingest");
        }
        selected
    }

    async fn embed_all(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>, RagError> {
        let batch_size = self.config.embed_batch_size.max(1);
        let mut embeddings = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.gateway.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(GatewayError::Transient(format!(
                    "embedding count mismatch: expected {}, got {}",
                    texts.len(),
                    vectors.len()
                ))
                .into());
            }
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    async fn ensure_store(&self) -> Result<Arc<dyn ChunkStore>, RagError> {
        if let Some(store) = self.store.read().await.clone() {
            return Ok(store);
        }

        let mut slot = self.store.write().await;
        if let Some(store) = slot.clone() {
            return Ok(store);
        }

        let created: Arc<dyn ChunkStore> = Arc::new(SqliteChunkStore::open(&self.dir).await?);
        *slot = Some(created.clone());
        *self.open_error.write().unwrap_or_else(|e| e.into_inner()) = None;
        info!(dir = %self.dir.display(), "Created vector collection");
        Ok(created)
    }

    fn read_files(&self) -> std::sync::RwLockReadGuard<'_, IndexedFileSet> {
        self.files.read().unwrap_or_else(|e| e.into_inner())
    }
}
