//! Upscale orchestrator.
//!
//! Drives one invocation through the provider workflow:
//! - Identity: fresh per invocation, sent on every provider call
//! - Upload: credentials, then raw bytes to signed storage
//! - Authorization: solver solution exchanged for a provider token
//! - Generation: task creation, then polling until completion

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UpscaleConfig;
use crate::metrics::{POLL_ATTEMPTS, UPSCALE_DURATION, UPSCALE_REQUESTS};

use super::poller::{PollPolicy, ResultPoller};
use super::traits::{ChallengeSolver, UpscaleProvider};
use super::types::{GenerationRequest, ImageInput, InvocationId, ScaleFactor, UpscaleOutcome};
use super::{UpscaleError, UpscaleStep};

/// Runs upscale invocations against a provider and a challenge solver.
///
/// The orchestrator holds no per-invocation state and can serve any number
/// of concurrent invocations.
pub struct UpscaleOrchestrator {
    provider: Arc<dyn UpscaleProvider>,
    solver: Arc<dyn ChallengeSolver>,
    policy: PollPolicy,
}

impl UpscaleOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        provider: Arc<dyn UpscaleProvider>,
        solver: Arc<dyn ChallengeSolver>,
        policy: PollPolicy,
    ) -> Self {
        Self {
            provider,
            solver,
            policy,
        }
    }

    /// Create an orchestrator polling as configured.
    pub fn from_config(
        provider: Arc<dyn UpscaleProvider>,
        solver: Arc<dyn ChallengeSolver>,
        config: &UpscaleConfig,
    ) -> Self {
        Self::new(provider, solver, PollPolicy::from(config))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    /// Validate an untyped inbound request, then run it.
    ///
    /// `raw_scale` of `None` falls back to `default_scale`; anything present
    /// must parse to an allowed scale. Both checks happen before any network
    /// call.
    pub async fn upscale_input(
        &self,
        input: ImageInput,
        raw_scale: Option<&str>,
        default_scale: ScaleFactor,
        cancel: &CancellationToken,
    ) -> Result<UpscaleOutcome, UpscaleError> {
        let validated = input.into_bytes().and_then(|image| {
            let scale = match raw_scale {
                Some(raw) => raw.parse::<ScaleFactor>()?,
                None => default_scale,
            };
            Ok((image, scale))
        });

        match validated {
            Ok((image, scale)) => self.upscale(image, scale, cancel).await,
            Err(e) => {
                UPSCALE_REQUESTS.with_label_values(&[e.kind()]).inc();
                Err(e)
            }
        }
    }

    /// Upscale `image` by `scale`, returning the provider's result URL.
    pub async fn upscale(
        &self,
        image: Bytes,
        scale: ScaleFactor,
        cancel: &CancellationToken,
    ) -> Result<UpscaleOutcome, UpscaleError> {
        let started = Instant::now();

        let result = if image.is_empty() {
            Err(UpscaleError::InvalidInput(
                "Image must be a non-empty buffer.".to_string(),
            ))
        } else {
            self.run(image, scale, cancel).await
        };

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.kind(),
        };
        UPSCALE_REQUESTS.with_label_values(&[label]).inc();
        UPSCALE_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        if let Err(e) = &result {
            warn!(kind = e.kind(), error = %e, "Upscale failed");
        }
        result
    }

    async fn run(
        &self,
        image: Bytes,
        scale: ScaleFactor,
        cancel: &CancellationToken,
    ) -> Result<UpscaleOutcome, UpscaleError> {
        let identity = InvocationId::generate();
        info!(%identity, %scale, bytes = image.len(), "Starting upscale");

        let slot = step(
            cancel,
            UpscaleStep::Credentials,
            self.provider.request_upload_slot(&identity),
        )
        .await?;
        debug!(%identity, "Upload slot acquired");

        step(
            cancel,
            UpscaleStep::Upload,
            self.provider.upload_image(&slot, image),
        )
        .await?;
        debug!(%identity, "Image uploaded");

        let solved = step(cancel, UpscaleStep::ChallengeSolve, self.solver.solve()).await?;
        debug!(%identity, solver = self.solver.name(), "Challenge solved");

        let token = step(
            cancel,
            UpscaleStep::ChallengeExchange,
            self.provider.exchange_challenge(&identity, &solved),
        )
        .await?;
        debug!(%identity, "Challenge token issued");

        let request = GenerationRequest {
            image_url: slot.get,
            scale,
        };
        let creation_id = step(
            cancel,
            UpscaleStep::TaskCreation,
            self.provider.create_task(&identity, &token, &request),
        )
        .await?;
        info!(%identity, %creation_id, "Generation task created");

        let poll_result = ResultPoller::new(self.provider.as_ref(), self.policy)
            .wait_for(&identity, &creation_id, cancel)
            .await;

        match &poll_result {
            Ok(done) => POLL_ATTEMPTS
                .with_label_values(&["success"])
                .observe(done.attempts as f64),
            Err(UpscaleError::PollTimeout { attempts }) => POLL_ATTEMPTS
                .with_label_values(&["timeout"])
                .observe(*attempts as f64),
            Err(_) => {}
        }
        let done = poll_result?;

        Ok(UpscaleOutcome {
            url: done.url,
            identity,
            creation_id,
            scale,
            poll_attempts: done.attempts,
            completed_at: Utc::now(),
        })
    }
}

/// Run one workflow step unless the invocation is cancelled first.
async fn step<T, F>(
    cancel: &CancellationToken,
    step: UpscaleStep,
    fut: F,
) -> Result<T, UpscaleError>
where
    F: Future<Output = Result<T, UpscaleError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UpscaleError::Cancelled { step }),
        result = fut => result,
    }
}
