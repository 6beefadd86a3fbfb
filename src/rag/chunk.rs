use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What part of a document a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    #[default]
    Text,
    ImageCaption,
    Table,
}

impl ChunkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkKind::Text => "text",
            ChunkKind::ImageCaption => "image_caption",
            ChunkKind::Table => "table",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ChunkKind::Text),
            "image_caption" => Some(ChunkKind::ImageCaption),
            "table" => Some(ChunkKind::Table),
            _ => None,
        }
    }
}

/// A normalized unit of extracted document content plus provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    #[serde(default)]
    pub source_id: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub kind: ChunkKind,
    #[serde(default)]
    pub origin_file: String,
}

impl Chunk {
    pub fn new(content: impl Into<String>, origin_file: impl Into<String>) -> Self {
        let origin_file = origin_file.into();
        Self {
            content: content.into(),
            source_id: origin_file.clone(),
            page: None,
            kind: ChunkKind::Text,
            origin_file,
        }
    }

    pub fn with_source(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = source_id.into();
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_kind(mut self, kind: ChunkKind) -> Self {
        self.kind = kind;
        self
    }

    /// Content-derived identity: the same text from the same file location
    /// always maps to the same id.
    pub fn content_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.origin_file.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.page.map(|p| p.to_string()).unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity (higher = closer).
    pub score: f32,
}

/// Hits ordered by descending score, ties in insertion order.
pub type RetrievalResult = Vec<ScoredChunk>;
