//! Main entry point for the Image Generation Router

use imagegen_router::{
    api,
    backend::clock::SystemClock,
    config::Settings,
    telemetry::LogSink,
    AppState,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = Settings::load()?;

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    if settings.logging.format == "pretty" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    }

    info!("Starting Image Generation Router");
    info!(
        "Loaded configuration: server={}:{} primary={:?} mock_mode={} failover={}",
        settings.server.host,
        settings.server.port,
        settings.routing.primary,
        settings.routing.mock_mode,
        settings.routing.failover_enabled
    );

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let health_enabled = settings.health.enabled;
    let health_interval = settings.health.interval_secs;

    // Create application state
    let app_state = Arc::new(AppState::build(
        settings,
        Arc::new(LogSink),
        Arc::new(SystemClock),
    )?);

    // Start health check background task
    if health_enabled {
        app_state.health.start(health_interval).await;
    }

    // Build the router
    let app = api::routes::create_router(app_state.clone()).await;

    info!("Server listening on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    app_state.health.stop().await;

    Ok(())
}
