// Pipeline State
// Per-query record threaded through retrieve -> synthesize

use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;
use crate::rag::{Chunk, RetrievalResult};

/// Pipeline stages. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Start,
    Retrieved,
    Answered,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Retrieved => "retrieved",
            Stage::Answered => "answered",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Stage::Start => 0,
            Stage::Retrieved => 1,
            Stage::Answered => 2,
        }
    }

    /// `Start -> Retrieved -> Answered`, plus `Start -> Answered` for runs
    /// that end in a fallback before retrieval completes.
    pub fn advance(self, next: Stage) -> Result<Stage, RagError> {
        if next.rank() > self.rank() {
            Ok(next)
        } else {
            Err(RagError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub content: String,
}

impl HistoryTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Page references from completions come back as numbers or labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PageRef {
    Number(u64),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub page: Option<PageRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_file: Option<String>,
}

impl Citation {
    /// Citation derived from retrieved chunk metadata, 1-based.
    pub fn from_chunk(index: usize, chunk: &Chunk) -> Self {
        Self {
            index,
            source: chunk.source_id.clone(),
            page: chunk.page.map(|p| PageRef::Number(u64::from(p))),
            excerpt: None,
            kind: Some(chunk.kind.as_str().to_string()),
            origin_file: Some(chunk.origin_file.clone()),
        }
    }
}

/// Metadata stored with an assistant turn.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnswerMetadata {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub hypothesis: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub sources: Vec<Citation>,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievedDoc {
    pub content: String,
    pub metadata: Citation,
    pub score: f32,
}

/// Stable JSON contract handed to callers.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub answer: String,
    pub reasoning: String,
    pub hypothesis: String,
    pub suggestions: Vec<String>,
    pub sources: Vec<Citation>,
    pub confidence: f64,
    pub question: String,
    pub retrieved_docs: Vec<RetrievedDoc>,
    pub degraded: bool,
}

impl Answer {
    pub fn metadata(&self) -> AnswerMetadata {
        AnswerMetadata {
            reasoning: self.reasoning.clone(),
            hypothesis: self.hypothesis.clone(),
            suggestions: self.suggestions.clone(),
            sources: self.sources.clone(),
            confidence: self.confidence,
        }
    }
}

/// Transient per-query record. Never persisted directly.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub stage: Stage,
    pub question: String,
    pub chat_history: Vec<HistoryTurn>,
    pub retrieved: RetrievalResult,
    pub answer: String,
    pub reasoning: String,
    pub hypothesis: String,
    pub suggestions: Vec<String>,
    pub sources: Vec<Citation>,
    pub confidence: f64,
    pub degraded: bool,
}

impl PipelineState {
    /// Keeps only the newest `max_turns` history entries.
    pub fn new(question: impl Into<String>, history: &[HistoryTurn], max_turns: usize) -> Self {
        let start = history.len().saturating_sub(max_turns);
        Self {
            question: question.into(),
            chat_history: history[start..].to_vec(),
            ..Self::default()
        }
    }

    pub fn advance(&mut self, next: Stage) -> Result<(), RagError> {
        self.stage = self.stage.advance(next)?;
        Ok(())
    }

    /// Citations for every retrieved chunk, in retrieval order.
    pub fn default_sources(&self, limit: usize) -> Vec<Citation> {
        self.retrieved
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, hit)| Citation::from_chunk(i + 1, &hit.chunk))
            .collect()
    }

    pub fn into_answer(self) -> Answer {
        let retrieved_docs = self
            .retrieved
            .iter()
            .enumerate()
            .map(|(i, hit)| RetrievedDoc {
                content: hit.chunk.content.clone(),
                metadata: Citation::from_chunk(i + 1, &hit.chunk),
                score: hit.score,
            })
            .collect();

        Answer {
            answer: self.answer,
            reasoning: self.reasoning,
            hypothesis: self.hypothesis,
            suggestions: self.suggestions,
            sources: self.sources,
            confidence: self.confidence,
            question: self.question,
            retrieved_docs,
            degraded: self.degraded,
        }
    }
}
