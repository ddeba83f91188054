use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::jwt::{AuthError, IdentityVerifier};
use crate::utils::error::ApiError;

/// Identity step of the pipeline. Puts the resolved
/// [`Principal`](super::Principal) into request extensions.
pub async fn require_principal(
    State(verifier): State<Arc<IdentityVerifier>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let principal = match verifier.verify(raw_header).await {
        Ok(principal) => principal,
        Err(e @ AuthError::DirectoryUnavailable(_)) => {
            error!("Identity check could not complete: {}", e);
            return Err(ApiError::InternalError(
                "Identity service unavailable".to_string(),
            ));
        }
        Err(e) => {
            warn!(kind = e.kind(), path = %request.uri().path(), "Rejected credential: {}", e);
            return Err(e.into());
        }
    };

    debug!("Request authenticated as {}", principal.id);
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}
