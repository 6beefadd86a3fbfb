//! Retrieve-then-synthesize question answering.
//!
//! A run is `synthesize(retrieve(Start))`. Each stage consumes the state and
//! hands back the next one; failures other than `NotInitialized` end the run
//! in a degraded `Answered` state instead of an error.

pub mod parse;
pub mod prompt;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::core::config::PipelineConfig;
use crate::core::errors::{GatewayError, RagError};
use crate::gateway::Gateway;
use crate::rag::VectorIndex;

pub use state::{
    Answer, AnswerMetadata, Citation, HistoryTurn, PageRef, PipelineState, RetrievedDoc, Role,
    Stage,
};

const GENERATION_FAILED_ANSWER: &str =
    "I ran into a problem while generating an answer. Please try rephrasing your question.";
const RETRIEVAL_FAILED_ANSWER: &str =
    "I could not search the document collection for this question. Please try again.";
const MISSING_ANSWER: &str = "Unable to generate an answer.";
const PARSE_FALLBACK_CONFIDENCE: f64 = 0.5;

fn retry_suggestions() -> Vec<String> {
    vec![
        "Try rephrasing the question".to_string(),
        "Check that the indexed documents cover this topic".to_string(),
    ]
}

pub struct RagPipeline {
    index: Arc<VectorIndex>,
    gateway: Arc<dyn Gateway>,
    config: PipelineConfig,
    retrieval_k: usize,
    completion_timeout: Duration,
}

impl RagPipeline {
    pub fn new(index: Arc<VectorIndex>, gateway: Arc<dyn Gateway>, config: PipelineConfig) -> Self {
        let retrieval_k = index.default_k();
        let completion_timeout = Duration::from_secs(config.completion_timeout_secs);
        Self {
            index,
            gateway,
            config,
            retrieval_k,
            completion_timeout,
        }
    }

    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout = timeout;
        self
    }

    pub fn max_history_turns(&self) -> usize {
        self.config.max_history_turns
    }

    /// Runs both stages for `question` with the caller's history.
    pub async fn run(&self, question: &str, history: &[HistoryTurn]) -> Result<Answer, RagError> {
        let state = PipelineState::new(question, history, self.config.max_history_turns);
        let state = self.retrieve(state).await?;
        let state = if state.stage == Stage::Answered {
            state
        } else {
            self.synthesize(state).await?
        };

        info!(
            confidence = state.confidence,
            degraded = state.degraded,
            retrieved = state.retrieved.len(),
            "Pipeline run finished"
        );
        Ok(state.into_answer())
    }

    /// `Start -> Retrieved`. Only `NotInitialized` escapes as an error.
    pub async fn retrieve(&self, mut state: PipelineState) -> Result<PipelineState, RagError> {
        if state.stage != Stage::Start {
            return Err(RagError::InvalidTransition {
                from: state.stage.as_str(),
                to: Stage::Retrieved.as_str(),
            });
        }

        match self.index.query(&state.question, self.retrieval_k).await {
            Ok(hits) => {
                debug!(hits = hits.len(), "Retrieved chunks");
                state.retrieved = hits;
                state.advance(Stage::Retrieved)?;
                Ok(state)
            }
            Err(RagError::NotInitialized) => Err(RagError::NotInitialized),
            Err(err) => {
                warn!(error = %err, "Retrieval failed, answering with fallback");
                state.answer = RETRIEVAL_FAILED_ANSWER.to_string();
                state.reasoning = format!("Retrieval error: {}", err);
                state.suggestions = retry_suggestions();
                state.confidence = 0.0;
                state.degraded = true;
                state.advance(Stage::Answered)?;
                Ok(state)
            }
        }
    }

    /// `Retrieved -> Answered`. Gateway and parse failures produce a
    /// degraded answer.
    pub async fn synthesize(&self, mut state: PipelineState) -> Result<PipelineState, RagError> {
        if state.stage != Stage::Retrieved {
            return Err(RagError::InvalidTransition {
                from: state.stage.as_str(),
                to: Stage::Answered.as_str(),
            });
        }

        let context = prompt::build_context(
            &state.retrieved,
            self.config.max_context_chunks,
            self.config.chunk_char_budget,
        );
        let history = prompt::format_history(
            &state.chat_history,
            self.config.max_history_turns,
            self.config.history_turn_chars,
        );
        let user_prompt = prompt::user_prompt(&state.question, &context, &history);
        let default_sources = state.default_sources(self.config.max_context_chunks);

        let completion = match tokio::time::timeout(
            self.completion_timeout,
            self.gateway.complete(prompt::SYSTEM_PROMPT, &user_prompt),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Transient(format!(
                "completion timed out after {:?}",
                self.completion_timeout
            ))),
        };

        match completion {
            Ok(raw) => match parse::parse_structured_answer(&raw) {
                Ok(parsed) => {
                    state.answer = parsed
                        .answer
                        .filter(|a| !a.trim().is_empty())
                        .unwrap_or_else(|| MISSING_ANSWER.to_string());
                    state.reasoning = parsed.reasoning;
                    state.hypothesis = parsed.hypothesis;
                    state.suggestions = parsed.suggestions;
                    state.sources = if parsed.sources.is_empty() {
                        default_sources
                    } else {
                        parsed.sources
                    };
                    state.confidence = parsed.confidence;
                }
                Err(err) => {
                    warn!(error = %err, "Completion was not valid structured output, using raw text");
                    state.answer = raw;
                    state.confidence = PARSE_FALLBACK_CONFIDENCE;
                    state.degraded = true;
                }
            },
            Err(err) => {
                warn!(error = %err, gateway = self.gateway.name(), "Completion failed, answering with fallback");
                state.answer = GENERATION_FAILED_ANSWER.to_string();
                state.reasoning = format!("Answer generation error: {}", err);
                state.suggestions = retry_suggestions();
                state.sources = default_sources;
                state.confidence = 0.0;
                state.degraded = true;
            }
        }

        state.advance(Stage::Answered)?;
        Ok(state)
    }
}
