use crate::{
    memory::ConversationTurn,
    types::{
        AppError, MemoryAddRequest, MemoryAddResponse, MemorySearchRequest, MessageResponse,
        Result,
    },
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};

/// Submit a conversation thread for memory extraction
///
/// Returns the memory decision, or `{"memory": []}` when nothing was
/// remembered.
#[utoipa::path(
    post,
    path = "/memory/add",
    request_body = MemoryAddRequest,
    responses(
        (status = 200, description = "Memory decision", body = MemoryAddResponse),
        (status = 400, description = "Missing user_id or no user message in the thread"),
        (status = 409, description = "User id collides with another user's namespace"),
        (status = 502, description = "Classifier output malformed or upstream failed")
    ),
    tag = "memory"
)]
pub async fn add_memory(
    State(state): State<AppState>,
    Json(payload): Json<MemoryAddRequest>,
) -> Result<Json<MemoryAddResponse>> {
    if payload.user_id.trim().is_empty() {
        return Err(AppError::InvalidInput("User ID is required".to_string()));
    }
    let turn = ConversationTurn::from_thread(&payload.message)?;

    let outcome = state.memory.decide_and_write(&payload.user_id, &turn).await?;

    Ok(Json(MemoryAddResponse {
        response: outcome.to_response_json(),
    }))
}

/// Search a user's memory
#[utoipa::path(
    post,
    path = "/memory/search",
    request_body = MemorySearchRequest,
    responses(
        (status = 200, description = "Ranked results, or an error object when the user has no memory"),
        (status = 400, description = "Missing user_id or query"),
        (status = 409, description = "User id collides with another user's namespace"),
        (status = 502, description = "Index upstream failed")
    ),
    tag = "memory"
)]
pub async fn search_memory(
    State(state): State<AppState>,
    Json(payload): Json<MemorySearchRequest>,
) -> Result<Json<serde_json::Value>> {
    if payload.user_id.trim().is_empty() || payload.query.trim().is_empty() {
        return Err(AppError::InvalidInput(
            "User ID and query are required".to_string(),
        ));
    }

    let outcome = state
        .memory
        .retrieve(&payload.user_id, &payload.query, payload.top_k)
        .await?;

    Ok(Json(outcome.to_json()))
}

/// Delete all of a user's memory
#[utoipa::path(
    delete,
    path = "/memory/{user_id}",
    params(("user_id" = String, Path, description = "User identifier")),
    responses(
        (status = 200, description = "Memory deleted", body = MessageResponse),
        (status = 404, description = "User has no memory"),
        (status = 409, description = "User id collides with another user's namespace"),
        (status = 502, description = "Index upstream failed")
    ),
    tag = "memory"
)]
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    if !state.memory.forget(&user_id).await? {
        return Err(AppError::NotFound(format!(
            "No memory exist for user '{}'",
            user_id
        )));
    }

    Ok(Json(MessageResponse {
        message: "Memory deleted successfully.".to_string(),
    }))
}
