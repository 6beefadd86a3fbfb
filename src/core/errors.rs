use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Failure kinds reported by the embedding/completion gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("gateway authentication failed: {0}")]
    Auth(String),
    #[error("gateway request failed: {0}")]
    Transient(String),
}

impl GatewayError {
    pub fn transient<E: std::fmt::Display>(err: E) -> Self {
        GatewayError::Transient(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("vector index is not initialized")]
    NotInitialized,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("malformed structured completion: {0}")]
    Parse(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::NotInitialized => ApiError::Conflict(err.to_string()),
            RagError::SessionNotFound(id) => ApiError::NotFound(format!("Session not found: {}", id)),
            RagError::Config(msg) => ApiError::BadRequest(msg),
            RagError::Gateway(inner) => ApiError::ServiceUnavailable(inner.to_string()),
            other => ApiError::internal(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({ "error": message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_errors_map_to_http_categories() {
        assert!(matches!(
            ApiError::from(RagError::NotInitialized),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from(RagError::SessionNotFound("abc".to_string())),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from(RagError::Gateway(GatewayError::Auth("bad key".to_string()))),
            ApiError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            ApiError::from(RagError::storage("disk full")),
            ApiError::Internal(_)
        ));
    }
}
