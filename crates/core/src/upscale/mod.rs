//! Remote upscale orchestration.
//!
//! One invocation walks the provider workflow in strict order:
//! upload credentials, byte upload, challenge solve, challenge exchange,
//! task creation, then result polling. Any failure aborts the invocation;
//! nothing is retried or persisted.

mod orchestrator;
mod poller;
mod provider;
mod solver;
mod traits;
mod types;

pub use orchestrator::UpscaleOrchestrator;
pub use poller::{CompletedTask, PollPolicy, ResultPoller};
pub use provider::HttpUpscaleProvider;
pub use solver::HttpChallengeSolver;
pub use traits::{ChallengeSolver, UpscaleProvider};
pub use types::*;

use std::fmt;

use thiserror::Error;

/// Workflow step, used to label failures, logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpscaleStep {
    Credentials,
    Upload,
    ChallengeSolve,
    ChallengeExchange,
    TaskCreation,
    Poll,
}

impl UpscaleStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::Upload => "upload",
            Self::ChallengeSolve => "challenge_solve",
            Self::ChallengeExchange => "challenge_exchange",
            Self::TaskCreation => "task_creation",
            Self::Poll => "poll",
        }
    }
}

impl fmt::Display for UpscaleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that abort an upscale invocation.
#[derive(Debug, Error)]
pub enum UpscaleError {
    /// Payload or scale rejected before any network call.
    #[error("{0}")]
    InvalidInput(String),

    /// Upload-token response had no usable slot.
    #[error("Upload url not found: {0}")]
    Credential(String),

    /// Object storage refused the upload.
    #[error("Failed to upload image: {0}")]
    Upload(String),

    /// Solver returned no solution.
    #[error("Failed to get challenge solution: {0}")]
    ChallengeSolve(String),

    /// Provider returned no challenge token.
    #[error("Failed to get challenge token: {0}")]
    ChallengeExchange(String),

    /// Provider returned no creation id.
    #[error("Failed to create task: {0}")]
    TaskCreation(String),

    /// Task did not complete within the polling bound.
    #[error("Upscale timeout after {attempts} attempts. Please try again.")]
    PollTimeout { attempts: u32 },

    /// Caller cancelled the invocation.
    #[error("Upscale cancelled during {step}")]
    Cancelled { step: UpscaleStep },

    /// Transport failure talking to a remote service.
    #[error("Network error during {step}: {message}")]
    Network { step: UpscaleStep, message: String },
}

impl UpscaleError {
    /// Stable tag for API payloads and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Credential(_) => "credential",
            Self::Upload(_) => "upload",
            Self::ChallengeSolve(_) => "challenge_solve",
            Self::ChallengeExchange(_) => "challenge_exchange",
            Self::TaskCreation(_) => "task_creation",
            Self::PollTimeout { .. } => "poll_timeout",
            Self::Cancelled { .. } => "cancelled",
            Self::Network { .. } => "network",
        }
    }

    /// Wrap a transport error raised during `step`.
    pub fn network(step: UpscaleStep, err: reqwest::Error) -> Self {
        Self::Network {
            step,
            message: err.to_string(),
        }
    }

    /// Build the step-specific "unexpected response" error.
    pub(crate) fn for_step(step: UpscaleStep, message: String) -> Self {
        match step {
            UpscaleStep::Credentials => Self::Credential(message),
            UpscaleStep::Upload => Self::Upload(message),
            UpscaleStep::ChallengeSolve => Self::ChallengeSolve(message),
            UpscaleStep::ChallengeExchange => Self::ChallengeExchange(message),
            UpscaleStep::TaskCreation => Self::TaskCreation(message),
            UpscaleStep::Poll => Self::Network { step, message },
        }
    }
}
