//! SQLite-backed vector collection.
//!
//! In-process store using SQLite for chunk metadata and serialized
//! embeddings, with brute-force cosine similarity for search.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::chunk::{Chunk, ChunkKind, RetrievalResult, ScoredChunk};
use super::similarity::rank_descending_by_cosine;
use super::store::ChunkStore;
use crate::core::errors::RagError;

pub const COLLECTION_FILE: &str = "collection.db";

pub struct SqliteChunkStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteChunkStore {
    /// Opens (or creates) the collection database inside `dir`.
    pub async fn open(dir: &Path) -> Result<Self, RagError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(RagError::storage)?;
        Self::with_path(dir.join(COLLECTION_FILE)).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Full)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::storage)?;

        let store = Self { pool, db_path };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Collection database plus its WAL side files.
    pub fn collection_files(dir: &Path) -> [PathBuf; 3] {
        [
            dir.join(COLLECTION_FILE),
            dir.join(format!("{}-wal", COLLECTION_FILE)),
            dir.join(format!("{}-shm", COLLECTION_FILE)),
        ]
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source_id TEXT NOT NULL DEFAULT '',
                page INTEGER,
                kind TEXT NOT NULL DEFAULT 'text',
                origin_file TEXT NOT NULL DEFAULT '',
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_origin_file ON chunks(origin_file)")
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_kind ON chunks(kind)")
            .execute(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &sqlx::sqlite::SqliteRow) -> Chunk {
        let kind: String = row.get("kind");
        let page: Option<i64> = row.get("page");

        Chunk {
            content: row.get("content"),
            source_id: row.get("source_id"),
            page: page.and_then(|p| u32::try_from(p).ok()),
            kind: ChunkKind::parse(&kind).unwrap_or_default(),
            origin_file: row.get("origin_file"),
        }
    }
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    async fn insert_batch(&self, items: Vec<(Chunk, Vec<f32>)>) -> Result<usize, RagError> {
        if items.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(RagError::storage)?;
        let mut added = 0usize;

        for (chunk, embedding) in &items {
            let blob = Self::serialize_embedding(embedding);

            let result = sqlx::query(
                "INSERT OR IGNORE INTO chunks (chunk_id, content, source_id, page, kind, origin_file, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(chunk.content_id())
            .bind(&chunk.content)
            .bind(&chunk.source_id)
            .bind(chunk.page.map(i64::from))
            .bind(chunk.kind.as_str())
            .bind(&chunk.origin_file)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::storage)?;

            added += result.rows_affected() as usize;
        }

        tx.commit().await.map_err(RagError::storage)?;
        Ok(added)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        kind: Option<ChunkKind>,
    ) -> Result<RetrievalResult, RagError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = if let Some(kind) = kind {
            sqlx::query(
                "SELECT content, source_id, page, kind, origin_file, embedding
                 FROM chunks
                 WHERE kind = ?1
                 ORDER BY rowid ASC",
            )
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?
        } else {
            sqlx::query(
                "SELECT content, source_id, page, kind, origin_file, embedding
                 FROM chunks
                 ORDER BY rowid ASC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(RagError::storage)?
        };

        let embeddings: Vec<Vec<f32>> = rows
            .iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                Self::deserialize_embedding(&bytes)
            })
            .collect();

        let ranked = rank_descending_by_cosine(query_embedding, &embeddings);
        Ok(ranked
            .into_iter()
            .take(limit)
            .map(|(idx, score)| ScoredChunk {
                chunk: Self::row_to_chunk(&rows[idx]),
                score,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::storage)?;

        Ok(count as usize)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
