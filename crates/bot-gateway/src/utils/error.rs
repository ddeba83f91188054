use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::auth::AuthError;
use crate::security::{apply_rate_limit_headers, RateDecision};
use crate::services::bots::BotError;
use crate::services::chat_service::ChatError;
use crate::services::conversation::LedgerError;
use crate::services::llm_service::LlmError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Too many requests")]
    RateLimited(RateDecision),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("LLM error: {0}")]
    LlmError(String),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_ms: Option<u64>,
}

impl From<AuthError> for ApiError {
    /// Every credential failure looks the same from outside; the kind is
    /// only logged.
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::ServerMisconfigured(msg)
            | AuthError::DirectoryUnavailable(msg)
            | AuthError::Signing(msg) => ApiError::InternalError(msg),
            _ => ApiError::Unauthorized("Invalid or missing credentials".to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        ApiError::PersistenceError(e.to_string())
    }
}

impl From<LlmError> for ApiError {
    fn from(e: LlmError) -> Self {
        ApiError::LlmError(e.to_string())
    }
}

impl From<BotError> for ApiError {
    fn from(e: BotError) -> Self {
        ApiError::InternalError(e.to_string())
    }
}

impl From<ChatError> for ApiError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::EmptyMessage
            | ChatError::MessageTooLong { .. }
            | ChatError::InvalidSessionId => ApiError::BadRequest(e.to_string()),
            ChatError::BotNotFound(id) => ApiError::NotFound(format!("Bot {} not found", id)),
            ChatError::Bots(e) => e.into(),
            ChatError::Llm(e) => e.into(),
            ChatError::Ledger(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut retry_after_ms = None;
        let mut rate_decision = None;

        let (status, error_type, message) = match self {
            ApiError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized", msg)
            }
            ApiError::Forbidden(msg) => {
                tracing::warn!("Forbidden: {}", msg);
                (StatusCode::FORBIDDEN, "Forbidden", msg)
            }
            ApiError::NotFound(msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, "NotFound", msg)
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, "BadRequest", msg)
            }
            ApiError::RateLimited(decision) => {
                retry_after_ms = decision.retry_after_ms;
                rate_decision = Some(decision);
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    "TooManyRequests",
                    "Too many requests, please try again later.".to_string(),
                )
            }
            ApiError::PersistenceError(msg) => {
                tracing::error!("Persistence error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PersistenceError",
                    "Failed to persist conversation".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
            ApiError::LlmError(msg) => {
                tracing::error!("LLM error: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "LlmError", msg)
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            retry_after_ms,
        });

        let mut response = (status, body).into_response();
        if let Some(decision) = rate_decision {
            apply_rate_limit_headers(response.headers_mut(), &decision);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_collapse_to_unauthorized() {
        for e in [
            AuthError::MissingCredential,
            AuthError::InvalidCredential("bad sig".to_string()),
            AuthError::ExpiredCredential,
            AuthError::CredentialNotYetValid,
            AuthError::UnknownPrincipal("u".to_string()),
        ] {
            let response = ApiError::from(e).into_response();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn test_chat_errors_map_to_client_statuses() {
        let response = ApiError::from(ChatError::EmptyMessage).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError::from(ChatError::BotNotFound("b".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError::from(ChatError::Llm(LlmError::EmptyResponse)).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_rate_limited_response() {
        let decision = RateDecision {
            allowed: false,
            retry_after_ms: Some(30_000),
            limit: 100,
            remaining: 0,
            reset_after_ms: 30_000,
            bypassed: false,
            deferred: false,
        };
        let response = ApiError::RateLimited(decision).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["retry-after"], "30");
        assert_eq!(response.headers()["ratelimit-limit"], "100");
    }
}
