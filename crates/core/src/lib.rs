pub mod config;
pub mod download;
pub mod metrics;
pub mod testing;
pub mod upscale;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, DownloadConfig,
    ProviderConfig, SanitizedConfig, ServerConfig, SolverConfig, UpscaleConfig,
};
pub use download::{DownloadError, DownloadedImage, ResultDownloader, DEFAULT_CONTENT_TYPE};
pub use upscale::{
    ChallengeSolver, CreationId, HttpChallengeSolver, HttpUpscaleProvider, ImageInput,
    InvocationId, PollPolicy, ScaleFactor, UpscaleError, UpscaleOrchestrator, UpscaleOutcome,
    UpscaleProvider, UpscaleStep,
};
