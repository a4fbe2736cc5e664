use super::{types::Config, ConfigError};
use crate::upscale::ScaleFactor;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Polling interval and attempt bound are positive
/// - Request deadline and outbound timeouts are positive
/// - Default scale is one the provider accepts
/// - Outbound URLs are http(s)
/// - The download proxy has at least one allowed host
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.upscale.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "upscale.poll_interval_ms must be greater than 0".to_string(),
        ));
    }

    if config.upscale.max_poll_attempts == 0 {
        return Err(ConfigError::ValidationError(
            "upscale.max_poll_attempts must be greater than 0".to_string(),
        ));
    }

    let timeouts = [
        (
            "upscale.request_timeout_secs",
            config.upscale.request_timeout_secs,
        ),
        ("provider.timeout_secs", u64::from(config.provider.timeout_secs)),
        ("solver.timeout_secs", u64::from(config.solver.timeout_secs)),
        ("download.timeout_secs", u64::from(config.download.timeout_secs)),
    ];
    for (field, secs) in timeouts {
        if secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "{} must be greater than 0",
                field
            )));
        }
    }

    if ScaleFactor::try_from(i64::from(config.upscale.default_scale)).is_err() {
        return Err(ConfigError::ValidationError(format!(
            "upscale.default_scale must be one of {}",
            ScaleFactor::allowed_list()
        )));
    }

    check_http_url("provider.base_url", &config.provider.base_url)?;
    check_http_url("solver.url", &config.solver.url)?;

    if config.download.allowed_hosts.is_empty() {
        return Err(ConfigError::ValidationError(
            "download.allowed_hosts cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn check_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| ConfigError::ValidationError(format!("{} is not a valid URL: {}", field, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::ValidationError(format!(
            "{} must use http or https, got {}",
            field, other
        ))),
    }
}
