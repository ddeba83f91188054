use axum::{extract::State, Json};
use tracing::{info, warn};

use crate::auth::{AuthError, IssuedToken};
use crate::models::TokenRequest;
use crate::state::AppState;
use crate::utils::error::ApiError;

/// Exchanges email + password for a signed bearer token.
pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let principal = state
        .directory
        .authenticate(request.email.trim(), &request.password)
        .await
        .map_err(AuthError::from)?;

    let Some(principal) = principal else {
        warn!("Credential issuance refused for {}", request.email.trim());
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    };

    let token = state.issuer.issue(&principal)?;
    info!("Issued token for principal {}", principal.id);
    Ok(Json(token))
}
