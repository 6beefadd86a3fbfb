//! Embedding/completion gateway.
//!
//! The core only talks to language services through [`Gateway`]; the
//! concrete OpenAI-compatible client lives in `openai`.

pub mod openai;
pub mod provider;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use openai::OpenAiGateway;
pub use provider::Gateway;
pub use types::{ChatMessage, ChatRequest};
