use axum::{
    extract::{Path, State},
    Json,
};
use tracing::debug;

use crate::models::{ChatRequest, ChatResponse};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Public widget route. No identity step, only the chat-turn admission policy.
pub async fn chat_turn(
    State(state): State<AppState>,
    Path(bot_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    debug!("Chat turn for bot {}", bot_id);

    let outcome = state
        .chat
        .handle_turn(&bot_id, request.session_id, &request.message)
        .await?;

    Ok(Json(ChatResponse {
        session_id: outcome.session_id,
        reply: outcome.reply,
        message_count: outcome.session.messages.len(),
    }))
}
