use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{error, warn};

use super::client_ip;
use super::policy::RatePolicy;
use super::rate_limit::{AdmissionController, RateDecision};
use crate::utils::error::ApiError;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Middleware state binding a route to its admission policy.
#[derive(Clone)]
pub struct AdmissionGuard {
    pub controller: Arc<AdmissionController>,
    pub policy: RatePolicy,
    pub trust_proxy: bool,
}

impl AdmissionGuard {
    pub fn new(controller: Arc<AdmissionController>, policy: RatePolicy, trust_proxy: bool) -> Self {
        Self {
            controller,
            policy,
            trust_proxy,
        }
    }
}

fn ceil_seconds(ms: u64) -> u64 {
    ms.div_ceil(1_000)
}

/// Writes `RateLimit-*` headers (and `Retry-After` on denial).
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateDecision) {
    if decision.bypassed {
        return;
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        RATELIMIT_RESET,
        HeaderValue::from(ceil_seconds(decision.reset_after_ms)),
    );
    if let Some(retry_after_ms) = decision.retry_after_ms {
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(ceil_seconds(retry_after_ms)),
        );
    }
}

/// Admission step of the pipeline. Store failures fail open.
pub async fn admit(
    State(guard): State<AdmissionGuard>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let scope_key = client_ip::scope_key(&request, guard.trust_proxy);

    let decision = match guard.controller.check(guard.policy, &scope_key).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(policy = %guard.policy, "Admission check failed open: {}", e);
            return Ok(next.run(request).await);
        }
    };

    if !decision.allowed {
        warn!(
            policy = %guard.policy,
            scope_key = %scope_key,
            retry_after_ms = decision.retry_after_ms,
            "Request rate limited"
        );
        return Err(ApiError::RateLimited(decision));
    }

    let mut response = next.run(request).await;

    if decision.deferred {
        let succeeded = response.status().as_u16() < 400;
        if let Err(e) = guard
            .controller
            .settle(guard.policy, &scope_key, &decision, succeeded)
            .await
        {
            error!(policy = %guard.policy, "Failed to record request outcome: {}", e);
        }
    }

    apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(allowed: bool) -> RateDecision {
        RateDecision {
            allowed,
            retry_after_ms: (!allowed).then_some(12_001),
            limit: 100,
            remaining: if allowed { 7 } else { 0 },
            reset_after_ms: 12_001,
            bypassed: false,
            deferred: false,
        }
    }

    #[test]
    fn test_headers_on_allow() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision(true));
        assert_eq!(headers[RATELIMIT_LIMIT], "100");
        assert_eq!(headers[RATELIMIT_REMAINING], "7");
        assert_eq!(headers[RATELIMIT_RESET], "13");
        assert!(headers.get(axum::http::header::RETRY_AFTER).is_none());
    }

    #[test]
    fn test_headers_on_deny() {
        let mut headers = HeaderMap::new();
        apply_rate_limit_headers(&mut headers, &decision(false));
        assert_eq!(headers[RATELIMIT_REMAINING], "0");
        assert_eq!(headers[axum::http::header::RETRY_AFTER], "13");
    }

    #[test]
    fn test_no_headers_when_bypassed() {
        let mut headers = HeaderMap::new();
        let mut d = decision(true);
        d.bypassed = true;
        apply_rate_limit_headers(&mut headers, &d);
        assert!(headers.is_empty());
    }
}
