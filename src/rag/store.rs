//! Storage interface behind the vector index.
//!
//! The primary implementation is `SqliteChunkStore` in the `sqlite` module.

use async_trait::async_trait;

use super::chunk::{Chunk, ChunkKind, RetrievalResult};
use crate::core::errors::RagError;

/// Abstract trait for vector collection backends.
///
/// Implementations should guarantee:
/// - `insert_batch` is all-or-nothing: once it returns `Ok`, every row is
///   durable; on `Err`, none are visible
/// - readers never observe a partially applied batch
/// - search results are ordered by descending score, ties in insertion order
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Insert chunks with their embeddings. Chunks whose content id is
    /// already stored are skipped. Returns the number of rows added.
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<usize, RagError>;

    /// Search for chunks similar to the query embedding, optionally
    /// restricted to one chunk kind.
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<RetrievalResult, RagError>;

    /// Total number of stored vectors.
    async fn count(&self) -> Result<usize, RagError>;

    /// Release the underlying handles before the collection is deleted.
    async fn close(&self);
}
