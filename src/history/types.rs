use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::{AnswerMetadata, HistoryTurn, Role};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AnswerMetadata>,
}

/// Session body, one JSON file per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Number of user turns.
    #[serde(default)]
    pub turn_count: usize,
}

impl ConversationSession {
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            title: self.title.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            turn_count: self.turn_count,
        }
    }

    pub fn history(&self) -> Vec<HistoryTurn> {
        self.messages
            .iter()
            .map(|m| HistoryTurn::new(m.role, m.content.clone()))
            .collect()
    }
}

/// Entry in the summary index (`index.json`), keyed by session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub turn_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionListItem {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub turn_count: usize,
}

impl SessionListItem {
    pub fn new(id: &str, summary: &SessionSummary) -> Self {
        Self {
            id: id.to_string(),
            title: summary.title.clone(),
            created_at: summary.created_at,
            updated_at: summary.updated_at,
            turn_count: summary.turn_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Title,
    Content,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub updated_at: DateTime<Utc>,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub total_conversations: usize,
    pub total_queries: usize,
}
