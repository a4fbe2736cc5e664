//! Result download proxy.
//!
//! The browser cannot fetch provider results directly, so the server streams
//! them through. Only hosts on the configured allowlist are fetched.

use std::time::{Duration, Instant};

use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, Response, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, DownloadConfig};
use crate::metrics;

/// Content type used when the source does not send one.
pub const DEFAULT_CONTENT_TYPE: &str = "image/png";

/// Errors from the download proxy.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Invalid URL source")]
    InvalidSource,

    #[error("Image too large: {size} bytes exceeds limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("Failed to fetch image: HTTP {status}")]
    Http { status: u16 },

    #[error("Failed to fetch image: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// An upstream response ready to be streamed to the client.
#[derive(Debug)]
pub struct DownloadedImage {
    pub content_type: String,
    pub content_length: Option<u64>,
    response: Response,
}

impl DownloadedImage {
    /// The underlying response, for streaming its body.
    pub fn into_inner(self) -> Response {
        self.response
    }
}

/// Fetches result images from allowlisted hosts.
pub struct ResultDownloader {
    client: Client,
    config: DownloadConfig,
}

impl ResultDownloader {
    pub fn new(config: DownloadConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("download HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Maximum body size that will be proxied.
    pub fn max_bytes(&self) -> u64 {
        self.config.max_bytes
    }

    /// Parse `raw` and check its host against the allowlist.
    ///
    /// A host matches an entry when it equals it or is a subdomain of it.
    pub fn check_source(&self, raw: &str) -> Result<Url, DownloadError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DownloadError::MissingUrl);
        }

        let url = Url::parse(raw).map_err(|_| DownloadError::InvalidSource)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(DownloadError::InvalidSource);
        }

        let host = url
            .host_str()
            .ok_or(DownloadError::InvalidSource)?
            .to_ascii_lowercase();
        let allowed = self.config.allowed_hosts.iter().any(|entry| {
            let entry = entry.trim().to_ascii_lowercase();
            host == entry || host.ends_with(&format!(".{}", entry))
        });

        if allowed {
            Ok(url)
        } else {
            Err(DownloadError::InvalidSource)
        }
    }

    /// Validate `raw` and start fetching it.
    ///
    /// Only the response head is read here; the body is left for the caller
    /// to stream.
    pub async fn fetch(&self, raw: &str) -> Result<DownloadedImage, DownloadError> {
        let url = self.check_source(raw)?;
        debug!(%url, "Fetching result image");

        let started = Instant::now();
        let result = self.request(url).await;
        metrics::observe_external(
            "download",
            "fetch",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    async fn request(&self, url: Url) -> Result<DownloadedImage, DownloadError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, &self.config.user_agent)
            .header(ACCEPT, "image/*")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        if let Some(size) = content_length {
            if size > self.config.max_bytes {
                return Err(DownloadError::TooLarge {
                    size,
                    limit: self.config.max_bytes,
                });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Ok(DownloadedImage {
            content_type,
            content_length,
            response,
        })
    }
}
