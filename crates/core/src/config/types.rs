use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub upscale: UpscaleConfig,
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Directory holding the browser UI, served for every non-API path.
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// Largest accepted upscale request body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 15; SM-F958 Build/AP3A.240905.015) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.6723.86 Mobile Safari/537.36";

/// Upscale provider (photo enhancer API) configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// API base URL, all provider endpoints are relative to it.
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    /// `origin` header sent with every provider call.
    #[serde(default = "default_provider_origin")]
    pub origin: String,
    /// `referer` header sent with every provider call.
    #[serde(default = "default_provider_referer")]
    pub referer: String,
    #[serde(default = "default_provider_user_agent")]
    pub user_agent: String,
    /// Per-call timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default = "default_app_code")]
    pub app_code: String,
    #[serde(default = "default_model_code")]
    pub model_code: String,
    /// Billing tag attached to generation tasks.
    #[serde(default = "default_currency_type")]
    pub currency_type: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            origin: default_provider_origin(),
            referer: default_provider_referer(),
            user_agent: default_provider_user_agent(),
            timeout_secs: default_timeout(),
            app_code: default_app_code(),
            model_code: default_model_code(),
            currency_type: default_currency_type(),
        }
    }
}

fn default_provider_base_url() -> String {
    "https://supawork.ai/supawork/headshot/api".to_string()
}

fn default_provider_origin() -> String {
    "https://supawork.ai/".to_string()
}

fn default_provider_referer() -> String {
    "https://supawork.ai/ai-photo-enhancer".to_string()
}

fn default_provider_user_agent() -> String {
    BROWSER_USER_AGENT.to_string()
}

fn default_app_code() -> String {
    "image_enhancer".to_string()
}

fn default_model_code() -> String {
    "supawork-ai".to_string()
}

fn default_currency_type() -> String {
    "silver".to_string()
}

/// Anti-bot challenge solver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SolverConfig {
    /// Solver endpoint receiving `{ url, siteKey }`.
    #[serde(default = "default_solver_url")]
    pub url: String,
    /// Site key of the challenge protecting the provider page.
    #[serde(default = "default_site_key")]
    pub site_key: String,
    /// Page the challenge is solved for.
    #[serde(default = "default_provider_referer")]
    pub page_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            url: default_solver_url(),
            site_key: default_site_key(),
            page_url: default_provider_referer(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_solver_url() -> String {
    "https://api.nekolabs.web.id/tools/bypass/cf-turnstile".to_string()
}

fn default_site_key() -> String {
    "0x4AAAAAACBjrLhJyEE6mq1c".to_string()
}

fn default_timeout() -> u32 {
    30
}

/// Orchestration tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpscaleConfig {
    /// Delay between result polls (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Polls before giving up with a timeout.
    #[serde(default = "default_max_poll_attempts")]
    pub max_poll_attempts: u32,
    /// Scale used when the request carries none.
    #[serde(default = "default_scale")]
    pub default_scale: u32,
    /// Overall deadline for one inbound upscale request (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for UpscaleConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            max_poll_attempts: default_max_poll_attempts(),
            default_scale: default_scale(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_max_poll_attempts() -> u32 {
    60
}

fn default_scale() -> u32 {
    4
}

fn default_request_timeout() -> u64 {
    120
}

/// Result download proxy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadConfig {
    /// Hosts the proxy may fetch from (exact match or subdomain).
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u32,
    /// Largest upstream body the proxy will relay.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_download_user_agent")]
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            allowed_hosts: default_allowed_hosts(),
            timeout_secs: default_download_timeout(),
            max_bytes: default_max_bytes(),
            user_agent: default_download_user_agent(),
        }
    }
}

fn default_allowed_hosts() -> Vec<String> {
    vec!["supawork.ai".to_string()]
}

fn default_download_timeout() -> u32 {
    60
}

fn default_max_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_download_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

/// Sanitized config for API responses (outbound endpoints reduced to hosts)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub provider: SanitizedProviderConfig,
    pub solver: SanitizedSolverConfig,
    pub upscale: UpscaleConfig,
    pub download: DownloadConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub base_url: String,
    pub timeout_secs: u32,
    pub app_code: String,
    pub model_code: String,
}

/// Solver details minus the site key.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSolverConfig {
    pub host: Option<String>,
    pub site_key_configured: bool,
    pub timeout_secs: u32,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            provider: SanitizedProviderConfig {
                base_url: config.provider.base_url.clone(),
                timeout_secs: config.provider.timeout_secs,
                app_code: config.provider.app_code.clone(),
                model_code: config.provider.model_code.clone(),
            },
            solver: SanitizedSolverConfig {
                host: reqwest::Url::parse(&config.solver.url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string)),
                site_key_configured: !config.solver.site_key.is_empty(),
                timeout_secs: config.solver.timeout_secs,
            },
            upscale: config.upscale.clone(),
            download: config.download.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_provider_contract() {
        let config = Config::default();
        assert_eq!(config.upscale.poll_interval_ms, 1000);
        assert_eq!(config.upscale.max_poll_attempts, 60);
        assert_eq!(config.upscale.default_scale, 4);
        assert_eq!(config.provider.app_code, "image_enhancer");
        assert_eq!(config.provider.currency_type, "silver");
        assert_eq!(config.download.max_bytes, 104_857_600);
    }

    #[test]
    fn test_sanitized_hides_site_key() {
        let config = Config::default();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains(&config.solver.site_key));
        assert!(sanitized.solver.site_key_configured);
        assert_eq!(sanitized.solver.host.as_deref(), Some("api.nekolabs.web.id"));
    }
}
