use crate::types::MessageResponse;
use axum::Json;

/// Welcome message
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Welcome message", body = MessageResponse)),
    tag = "health"
)]
pub async fn root() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the AI Chat API".to_string(),
    })
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String)),
    tag = "health"
)]
pub async fn health() -> &'static str {
    "OK"
}
