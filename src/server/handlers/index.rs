use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::Chunk;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub chunks: Vec<Chunk>,
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.index.stats().await)
}

pub async fn ingest_chunks(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let received = payload.chunks.len();
    let added = state.index.ingest(payload.chunks).await?;
    let stats = state.index.stats().await;
    Ok(Json(json!({
        "received": received,
        "added": added,
        "stats": stats,
    })))
}

pub async fn reset_index(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    state.index.reset().await?;
    Ok(Json(json!({"status": "reset"})))
}
