use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    models::chat::{ChatHistoryResponse, SendChatRequest, SendChatResponse},
    services::{chat_service::ChatService, AppState},
};

/// POST /api/v1/chat - Send a message to the assistant
///
/// The first message may omit `session_id`; the server mints one and the
/// client carries it on subsequent turns.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SendChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Err(e) = req.validate() {
        return Err((StatusCode::BAD_REQUEST, format!("Validation error: {}", e)));
    }

    let session_id = req
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let service = ChatService::new(state.redis.clone(), state.gemini.clone());
    let reply = service
        .send_message(&session_id, &req.message)
        .await
        .map_err(|e| {
            tracing::error!("Chat message failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process message".to_string(),
            )
        })?;

    Ok(Json(SendChatResponse { session_id, reply }))
}

/// GET /api/v1/chat/{session_id} - Conversation history
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ChatService::new(state.redis.clone(), state.gemini.clone());
    let messages = service.history(&session_id).await.map_err(|e| {
        tracing::error!("Failed to load chat history: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load history".to_string(),
        )
    })?;

    Ok(Json(ChatHistoryResponse {
        session_id,
        messages,
    }))
}

/// DELETE /api/v1/chat/{session_id} - Reset the conversation
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let service = ChatService::new(state.redis.clone(), state.gemini.clone());
    service.reset(&session_id).await.map_err(|e| {
        tracing::error!("Failed to reset chat session: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to reset session".to_string(),
        )
    })?;

    Ok(StatusCode::NO_CONTENT)
}
