use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use upscaler_core::{Config, ResultDownloader, SanitizedConfig, ScaleFactor, UpscaleOrchestrator};

/// Shared application state
pub struct AppState {
    config: Config,
    orchestrator: Arc<UpscaleOrchestrator>,
    downloader: Arc<ResultDownloader>,
    default_scale: ScaleFactor,
    /// Cancelled on server shutdown; every in-flight upscale derives from it.
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Config,
        orchestrator: Arc<UpscaleOrchestrator>,
        downloader: Arc<ResultDownloader>,
        shutdown: CancellationToken,
    ) -> Self {
        // validate_config has already rejected anything outside the allowed set
        let default_scale = ScaleFactor::try_from(i64::from(config.upscale.default_scale))
            .unwrap_or(ScaleFactor::X4);

        Self {
            config,
            orchestrator,
            downloader,
            default_scale,
            shutdown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn orchestrator(&self) -> &UpscaleOrchestrator {
        self.orchestrator.as_ref()
    }

    pub fn downloader(&self) -> &ResultDownloader {
        self.downloader.as_ref()
    }

    pub fn default_scale(&self) -> ScaleFactor {
        self.default_scale
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }
}
