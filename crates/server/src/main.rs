use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upscaler_core::{
    load_config, validate_config, ChallengeSolver, HttpChallengeSolver, HttpUpscaleProvider,
    ResultDownloader, UpscaleOrchestrator, UpscaleProvider,
};
use upscaler_server::{api::create_router, state::AppState};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("UPSCALER_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Provider: {}", config.provider.base_url);
    info!(
        "Polling every {}ms, at most {} attempts",
        config.upscale.poll_interval_ms, config.upscale.max_poll_attempts
    );

    // Create provider and solver clients
    let provider: Arc<dyn UpscaleProvider> = Arc::new(
        HttpUpscaleProvider::new(config.provider.clone())
            .context("Failed to create provider client")?,
    );
    let solver: Arc<dyn ChallengeSolver> = Arc::new(
        HttpChallengeSolver::new(config.solver.clone())
            .context("Failed to create challenge solver client")?,
    );
    info!(
        "Using provider '{}' with solver '{}'",
        provider.name(),
        solver.name()
    );

    let orchestrator = Arc::new(UpscaleOrchestrator::from_config(
        provider,
        solver,
        &config.upscale,
    ));

    let downloader = Arc::new(
        ResultDownloader::new(config.download.clone())
            .context("Failed to create download proxy client")?,
    );
    info!(
        "Download proxy allows: {}",
        config.download.allowed_hosts.join(", ")
    );

    // Cancelled on shutdown so in-flight upscales stop polling
    let shutdown = CancellationToken::new();

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator,
        downloader,
        shutdown.clone(),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM), then cancel in-flight work.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, cancelling in-flight upscales");
    shutdown.cancel();
}
