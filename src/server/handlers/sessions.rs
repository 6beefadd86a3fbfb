use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: String,
}

fn not_found(session_id: &str) -> ApiError {
    ApiError::NotFound(format!("Session not found: {}", session_id))
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let limit = params
        .limit
        .unwrap_or_else(|| state.conversations.default_list_limit());
    let sessions = state.conversations.list(limit).await;
    let stats = state.conversations.stats().await;
    Json(json!({"sessions": sessions, "stats": stats}))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state
        .conversations
        .create(payload.title.as_deref())
        .await?;
    let session = state
        .conversations
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::internal("Session vanished after creation"))?;
    Ok(Json(json!({"session": session})))
}

pub async fn search_sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let results = state.conversations.search(&params.q).await?;
    Ok(Json(json!({"results": results})))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .conversations
        .get(&session_id)
        .await?
        .ok_or_else(|| not_found(&session_id))?;
    Ok(Json(json!({"session": session})))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.conversations.exists(&session_id).await {
        return Err(not_found(&session_id));
    }
    let messages = state.conversations.messages(&session_id).await?;
    Ok(Json(json!({"messages": messages})))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title must not be empty".to_string()));
    }
    if !state
        .conversations
        .rename(&session_id, &payload.title)
        .await?
    {
        return Err(not_found(&session_id));
    }
    Ok(Json(json!({"success": true})))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = state.conversations.delete(&session_id).await?;
    Ok(Json(json!({"success": true, "deleted": deleted})))
}

pub async fn export_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let markdown = state
        .conversations
        .export_markdown(&session_id)
        .await?
        .ok_or_else(|| not_found(&session_id))?;
    Ok((
        [(header::CONTENT_TYPE, "text/markdown; charset=utf-8")],
        markdown,
    ))
}
