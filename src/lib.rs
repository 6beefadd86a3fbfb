//! Retrieval-augmented question answering over scientific documents.
//!
//! Chunks produced by an external extractor are embedded into a
//! file-deduplicated [`rag::VectorIndex`]; questions run through the
//! retrieve-then-synthesize [`pipeline::RagPipeline`]; multi-turn sessions are
//! persisted by [`history::ConversationStore`] and tied together by
//! [`session::SessionOrchestrator`].

pub mod core;
pub mod gateway;
pub mod history;
pub mod pipeline;
pub mod rag;
pub mod server;
pub mod session;
pub mod state;

pub use crate::core::errors::{ApiError, GatewayError, RagError};
pub use gateway::Gateway;
pub use history::ConversationStore;
pub use pipeline::{Answer, RagPipeline};
pub use rag::{Chunk, ChunkKind, VectorIndex};
pub use session::{SessionOrchestrator, TurnOutcome};
pub use state::AppState;
