use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::core::errors::ApiError;
use crate::pipeline::HistoryTurn;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub history: Vec<HistoryTurn>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub session_id: Option<String>,
}

fn require_question(question: &str) -> Result<(), ApiError> {
    if question.trim().is_empty() {
        return Err(ApiError::BadRequest("Question must not be empty".to_string()));
    }
    Ok(())
}

/// Stateless pipeline run with caller-supplied history.
pub async fn query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_question(&payload.question)?;
    let answer = state
        .pipeline
        .run(payload.question.trim(), &payload.history)
        .await?;
    Ok(Json(answer))
}

/// One orchestrated conversation turn.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_question(&payload.question)?;
    let outcome = state
        .orchestrator
        .ask(payload.session_id.as_deref(), payload.question.trim())
        .await?;
    Ok(Json(outcome))
}
