use dialogue_agent::{
    agent::Orchestrator,
    api::{start_server, ApiState},
    config::AppConfig,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("🚀 Dialogue Agent - API Server");
    info!("📍 Port: {}", config.port);

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);

    info!("✅ Orchestrator initialized");
    info!("📡 Starting API server...");

    let state = ApiState::new(orchestrator)
        .with_session_limits(config.session_idle, config.max_sessions);

    start_server(state, config.port).await?;

    Ok(())
}
