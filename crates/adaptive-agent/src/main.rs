use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use adaptive_agent::build_router;
use adaptive_agent::config::Settings;
use adaptive_agent::services::AdaptiveAgent;
use adaptive_agent::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_logger()?;

    info!("Starting adaptive agent...");

    let settings = Settings::load()?;
    info!("Configuration loaded");

    let agent = Arc::new(AdaptiveAgent::from_settings(&settings)?);
    agent.start();

    let app = build_router(agent.clone());

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, shutting down background tasks");
    agent.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
