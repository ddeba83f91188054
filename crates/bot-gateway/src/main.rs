use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use bot_gateway::auth::InMemoryDirectory;
use bot_gateway::config::Settings;
use bot_gateway::router::build_router;
use bot_gateway::security::AdmissionController;
use bot_gateway::services::LlmService;
use bot_gateway::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    let _log_guard = bot_gateway::logging::init(&settings.logging);

    info!("🚀 Starting bot gateway...");
    info!(
        "✅ Configuration loaded (environment={})",
        settings.security.environment
    );

    let directory = Arc::new(InMemoryDirectory::from_seeds(&settings.security.accounts)?);
    let responder = Arc::new(LlmService::new(settings.llm.clone())?);

    // Missing signing secret aborts here
    let state = AppState::build(settings.clone(), directory, responder)?;
    info!("✅ Identity verifier and admission controller ready");

    spawn_window_sweeper(
        state.admission.clone(),
        Duration::from_secs(settings.rate_limits.sweep_interval_seconds.max(1)),
    );

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Periodically evicts counter windows that have fully elapsed.
fn spawn_window_sweeper(controller: Arc<AdmissionController>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match controller.sweep_expired().await {
                Ok(0) => {}
                Ok(n) => info!("Swept {} expired admission window(s)", n),
                Err(e) => error!("Admission window sweep failed: {}", e),
            }
        }
    });
}
