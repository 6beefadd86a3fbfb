use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let index = state.index.stats().await;
    let conversations = state.conversations.stats().await;
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "index": index.status,
        "vector_count": index.vector_count,
        "conversations": conversations.total_conversations,
    }))
}
