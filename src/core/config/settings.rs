//! Typed, immutable runtime configuration.
//!
//! Built once by [`ConfigService`](super::ConfigService) and handed to each
//! component at construction time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub gateway: GatewayConfig,
    pub index: IndexConfig,
    pub pipeline: PipelineConfig,
    pub conversation: ConversationConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub completion_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            embedding_model: "text-embedding-3-large".to_string(),
            completion_model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tokens: 4000,
            request_timeout_secs: 60,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "****"))
            .field("embedding_model", &self.embedding_model)
            .field("completion_model", &self.completion_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Collection directory; relative paths resolve under the data dir.
    pub persist_dir: Option<String>,
    /// Default `k` for similarity queries.
    pub retrieval_k: usize,
    /// Chunks whose trimmed content is shorter than this are noise.
    pub min_chunk_chars: usize,
    pub embed_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            persist_dir: None,
            retrieval_k: 10,
            min_chunk_chars: 20,
            embed_batch_size: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_context_chunks: usize,
    pub chunk_char_budget: usize,
    pub max_history_turns: usize,
    pub history_turn_chars: usize,
    pub completion_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_context_chunks: 15,
            chunk_char_budget: 1000,
            max_history_turns: 8,
            history_turn_chars: 200,
            completion_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Characters of the first question used as an automatic title.
    pub title_prefix_chars: usize,
    pub max_title_chars: usize,
    pub default_list_limit: usize,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            title_prefix_chars: 50,
            max_title_chars: 160,
            default_list_limit: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_allowed_origins: Vec::new(),
        }
    }
}
