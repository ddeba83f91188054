use axum::{extract::State, http::StatusCode, Extension, Json};
use tracing::info;

use crate::auth::Principal;
use crate::models::CreateBotRequest;
use crate::services::Bot;
use crate::state::AppState;
use crate::utils::error::ApiError;

const MAX_BOT_NAME_CHARS: usize = 100;

pub async fn create_bot(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateBotRequest>,
) -> Result<(StatusCode, Json<Bot>), ApiError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Bot name is required".to_string()));
    }
    if name.chars().count() > MAX_BOT_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Bot name exceeds {} characters",
            MAX_BOT_NAME_CHARS
        )));
    }

    let bot = state
        .bots
        .create(&principal.id, name, request.system_prompt.trim())
        .await?;
    info!("Principal {} created bot {}", principal.id, bot.id);

    Ok((StatusCode::CREATED, Json(bot)))
}

pub async fn list_bots(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Vec<Bot>>, ApiError> {
    Ok(Json(state.bots.list_by_owner(&principal.id).await?))
}
