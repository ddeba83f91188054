use axum::{body::Bytes, Extension, Json};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::auth::Principal;
use crate::models::UploadReceipt;
use crate::utils::error::ApiError;

/// Accepts a raw body (size capped by the router) and returns its digest.
pub async fn upload_handler(
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Json<UploadReceipt>, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("Upload body is empty".to_string()));
    }

    let sha256 = hex::encode(Sha256::digest(&body));
    info!(
        "Upload from {}: {} bytes (sha256={})",
        principal.id,
        body.len(),
        sha256
    );

    Ok(Json(UploadReceipt {
        size: body.len(),
        sha256,
    }))
}
