//! Vector index over document chunks.
//!
//! This module provides:
//! - `Chunk` / `ScoredChunk`: normalized document content and search hits
//! - `VectorIndex`: incremental, file-deduplicated ingestion and similarity queries
//! - `ChunkStore`: the persisted collection behind the index (SQLite implementation)

pub mod chunk;
pub mod index;
pub mod manifest;
pub mod similarity;
pub mod sqlite;
pub mod store;

pub use chunk::{Chunk, ChunkKind, RetrievalResult, ScoredChunk};
pub use index::{IndexStats, IndexStatus, VectorIndex};
pub use manifest::IndexedFileSet;
pub use store::ChunkStore;
