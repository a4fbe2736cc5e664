//! Challenge solver client.
//!
//! The solver is a third-party service that completes the anti-bot
//! challenge for a page and site key and hands back the solution.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ConfigError, SolverConfig};
use crate::metrics;

use super::traits::ChallengeSolver;
use super::types::SolvedChallenge;
use super::{UpscaleError, UpscaleStep};

/// HTTP implementation of [`ChallengeSolver`].
pub struct HttpChallengeSolver {
    client: Client,
    config: SolverConfig,
}

impl HttpChallengeSolver {
    pub fn new(config: SolverConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("solver HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn request_solution(&self) -> Result<SolvedChallenge, UpscaleError> {
        let step = UpscaleStep::ChallengeSolve;
        let body = SolveRequest {
            url: &self.config.page_url,
            site_key: &self.config.site_key,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| UpscaleError::network(step, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(UpscaleError::ChallengeSolve(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text.chars().take(200).collect::<String>()
            )));
        }

        let parsed: SolveResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                UpscaleError::ChallengeSolve(format!("unexpected response body: {}", e))
            } else {
                UpscaleError::network(step, e)
            }
        })?;

        parsed
            .result
            .filter(|r| !r.is_empty())
            .map(SolvedChallenge)
            .ok_or_else(|| {
                UpscaleError::ChallengeSolve("solver response contained no result".to_string())
            })
    }
}

#[async_trait]
impl ChallengeSolver for HttpChallengeSolver {
    fn name(&self) -> &str {
        "http"
    }

    async fn solve(&self) -> Result<SolvedChallenge, UpscaleError> {
        debug!(page = %self.config.page_url, "Requesting challenge solution");

        let started = Instant::now();
        let result = self.request_solution().await;
        metrics::observe_external(
            "solver",
            "solve",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }
}

#[derive(Debug, Serialize)]
struct SolveRequest<'a> {
    url: &'a str,
    #[serde(rename = "siteKey")]
    site_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    result: Option<String>,
}
