use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============= API Request/Response Types =============

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ChatResponse {
    pub response: String,
}

/// A conversation thread submitted for memory extraction.
///
/// Entries are free-form maps: either `{"user": .., "ai": ..}` pairs or
/// `{"role": .., "content": ..}` messages.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemoryAddRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub message: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemoryAddResponse {
    #[schema(value_type = Object)]
    pub response: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MemorySearchRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

// ============= Error Types =============

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Malformed memory decision: {0}")]
    MalformedDecision(String),

    #[error("Namespace collision: {0}")]
    NamespaceCollision(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status this error maps to at the gateway.
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            AppError::VectorStore(_) | AppError::LLM(_) | AppError::MalformedDecision(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::NamespaceCollision(_) => StatusCode::CONFLICT,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
