use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use tracing::warn;

use crate::auth::Principal;
use crate::models::DeleteSessionResponse;
use crate::services::conversation::{ConversationSession, SessionSummary};
use crate::services::Bot;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Transcripts are only visible to the owner of the bot.
async fn owned_bot(state: &AppState, bot_id: &str, principal: &Principal) -> Result<Bot, ApiError> {
    let bot = state
        .bots
        .get(bot_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Bot {} not found", bot_id)))?;

    if !bot.is_owned_by(&principal.id) {
        warn!(
            "Principal {} tried to read transcripts of bot {}",
            principal.id, bot_id
        );
        return Err(ApiError::Forbidden("Not the owner of this bot".to_string()));
    }
    Ok(bot)
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(bot_id): Path<String>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let bot = owned_bot(&state, &bot_id, &principal).await?;
    Ok(Json(state.ledger.list_sessions(&bot.id).await?))
}

pub async fn get_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((bot_id, session_id)): Path<(String, String)>,
) -> Result<Json<ConversationSession>, ApiError> {
    let bot = owned_bot(&state, &bot_id, &principal).await?;
    state
        .ledger
        .get_session(&bot.id, &session_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Session {} not found", session_id)))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((bot_id, session_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<DeleteSessionResponse>), ApiError> {
    let bot = owned_bot(&state, &bot_id, &principal).await?;
    let deleted = state.ledger.delete_session(&bot.id, &session_id).await?;

    let status = if deleted {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    };
    Ok((status, Json(DeleteSessionResponse { deleted })))
}
