use crate::{
    types::{AppError, ChatRequest, ChatResponse, Result},
    AppState,
};
use axum::{extract::State, Json};

/// Chat with the memory-grounded assistant
#[utoipa::path(
    post,
    path = "/chat",
    request_body = ChatRequest,
    responses(
        (status = 200, description = "Chat response", body = ChatResponse),
        (status = 400, description = "Missing user_id or message"),
        (status = 502, description = "Completion or index upstream failed")
    ),
    tag = "chat"
)]
pub async fn chat(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    if payload.user_id.trim().is_empty() || payload.message.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "User ID and message are required".to_string(),
        ));
    }

    let response = state
        .chat
        .respond(&payload.user_id, &payload.message)
        .await?;

    Ok(Json(ChatResponse { response }))
}
