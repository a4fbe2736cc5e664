//! Result polling loop.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UpscaleConfig;

use super::traits::UpscaleProvider;
use super::types::{CreationId, InvocationId};
use super::{UpscaleError, UpscaleStep};

/// Polling cadence and bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Fixed delay after every unfinished poll.
    pub interval: Duration,
    /// Polls before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

impl From<&UpscaleConfig> for PollPolicy {
    fn from(config: &UpscaleConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.poll_interval_ms),
            max_attempts: config.max_poll_attempts,
        }
    }
}

/// A finished generation task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedTask {
    pub url: String,
    /// Polls issued, including the one that saw completion.
    pub attempts: u32,
}

/// Polls the provider's result listing until a task completes.
pub struct ResultPoller<'a> {
    provider: &'a dyn UpscaleProvider,
    policy: PollPolicy,
}

impl<'a> ResultPoller<'a> {
    pub fn new(provider: &'a dyn UpscaleProvider, policy: PollPolicy) -> Self {
        Self { provider, policy }
    }

    /// Poll until `creation_id` reports completion.
    ///
    /// Any status other than complete counts as pending. A transport error
    /// aborts immediately; cancellation is honored before each poll and
    /// during each delay.
    pub async fn wait_for(
        &self,
        identity: &InvocationId,
        creation_id: &CreationId,
        cancel: &CancellationToken,
    ) -> Result<CompletedTask, UpscaleError> {
        let cancelled = || UpscaleError::Cancelled {
            step: UpscaleStep::Poll,
        };

        for attempt in 1..=self.policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let listing = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                listing = self.provider.list_results(identity) => listing?,
            };

            match listing.locate(creation_id) {
                Some(item) => match item.completed_url() {
                    Some(url) => {
                        info!(%identity, %creation_id, attempt, "Upscale task completed");
                        return Ok(CompletedTask {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    None => {
                        if item.status == Some(super::types::STATUS_COMPLETE) {
                            warn!(%creation_id, attempt, "Task reported complete without a url");
                        } else {
                            debug!(
                                %creation_id,
                                attempt,
                                status = ?item.status,
                                "Task still processing"
                            );
                        }
                    }
                },
                None => debug!(%creation_id, attempt, "Task not listed yet"),
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }

        warn!(
            %identity,
            %creation_id,
            attempts = self.policy.max_attempts,
            "Upscale task did not complete in time"
        );
        Err(UpscaleError::PollTimeout {
            attempts: self.policy.max_attempts,
        })
    }
}
