use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware,
    routing::{delete, get, post, MethodRouter},
    Router,
};
use std::time::Duration;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};

use crate::auth::require_principal;
use crate::handlers;
use crate::security::{admit, AdmissionGuard, RatePolicy};
use crate::state::AppState;

fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Admission around the request timeout, so a timed-out request reaches
/// `admit` as a 408 and is settled like any other failure.
fn guarded<S>(route: MethodRouter<S>, guard: AdmissionGuard, timeout: Duration) -> MethodRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    route
        .route_layer(request_timeout(timeout))
        .route_layer(middleware::from_fn_with_state(guard, admit))
}

/// Admission step for one route.
fn admitted(route: MethodRouter<AppState>, state: &AppState, policy: RatePolicy) -> MethodRouter<AppState> {
    let guard = AdmissionGuard::new(
        state.admission.clone(),
        policy,
        state.settings.server.trust_proxy,
    );
    let timeout = Duration::from_secs(state.settings.server.request_timeout_seconds);
    guarded(route, guard, timeout)
}

/// Identity step, layered outside admission so it runs first.
fn authenticated(route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
    route.route_layer(middleware::from_fn_with_state(
        state.verifier.clone(),
        require_principal,
    ))
}

pub fn build_router(state: AppState) -> Router {
    let s = &state;
    let timeout = Duration::from_secs(state.settings.server.request_timeout_seconds);

    // Public routes (no pipeline)
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route_layer(request_timeout(timeout));

    // Admission only
    let open_routes = Router::new()
        .route(
            "/api/auth/token",
            admitted(post(handlers::auth::issue_token), s, RatePolicy::CredentialIssuance),
        )
        .route(
            "/api/bots/{bot_id}/chat",
            admitted(post(handlers::chat::chat_turn), s, RatePolicy::ChatTurn),
        );

    // Identity, then admission
    let protected_routes = Router::new()
        .route(
            "/api/bots",
            authenticated(admitted(post(handlers::bots::create_bot), s, RatePolicy::BotCreation), s)
                .merge(authenticated(admitted(get(handlers::bots::list_bots), s, RatePolicy::General), s)),
        )
        .route(
            "/api/bots/{bot_id}/sessions",
            authenticated(admitted(get(handlers::sessions::list_sessions), s, RatePolicy::General), s),
        )
        .route(
            "/api/bots/{bot_id}/sessions/{session_id}",
            authenticated(admitted(get(handlers::sessions::get_session), s, RatePolicy::General), s)
                .merge(authenticated(
                    admitted(delete(handlers::sessions::delete_session), s, RatePolicy::General),
                    s,
                )),
        )
        .route(
            "/api/uploads",
            authenticated(admitted(post(handlers::upload::upload_handler), s, RatePolicy::Upload), s),
        );

    let body_limit = state.settings.server.body_limit_bytes;

    Router::new()
        .merge(public_routes)
        .merge(open_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::new())
        // The widget is embedded on third-party sites
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PolicyOverride;
    use crate::security::{AdmissionConfig, AdmissionController, PolicyTable};
    use axum::{body::Body, extract::connect_info::MockConnectInfo, http::Request};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn stalled() -> &'static str {
        tokio::time::sleep(Duration::from_secs(5)).await;
        "done"
    }

    #[tokio::test]
    async fn test_timed_out_request_counts_against_skip_successful_budget() {
        let overrides = HashMap::from([(
            "credential-issuance".to_string(),
            PolicyOverride {
                window_ms: None,
                limit: Some(2),
            },
        )]);
        let controller = Arc::new(AdmissionController::in_memory(AdmissionConfig {
            enforced: true,
            table: PolicyTable::with_overrides(&overrides).unwrap(),
        }));
        let guard = AdmissionGuard::new(controller, RatePolicy::CredentialIssuance, false);

        let app: Router = Router::new()
            .route(
                "/login",
                guarded(get(stalled), guard, Duration::from_millis(20)),
            )
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 1], 4000))));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::get("/login").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        }

        let denied = app
            .oneshot(Request::get("/login").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
