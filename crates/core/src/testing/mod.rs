//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the provider and solver
//! traits, allowing end-to-end tests of the upscale workflow without any
//! third-party service.
//!
//! # Example
//!
//! ```rust,ignore
//! use upscaler_core::testing::{fixtures, MockChallengeSolver, MockUpscaleProvider};
//!
//! let provider = Arc::new(MockUpscaleProvider::new());
//! let solver = Arc::new(MockChallengeSolver::new());
//! provider.complete_after(2, "https://cdn.example/out.png").await;
//!
//! let orchestrator = UpscaleOrchestrator::new(provider.clone(), solver, PollPolicy::default());
//! let outcome = orchestrator.upscale(fixtures::png_bytes(), ScaleFactor::X4, &cancel).await?;
//! ```

mod mock_provider;
mod mock_solver;

pub use mock_provider::{MockUpscaleProvider, ProviderCall, MOCK_CHALLENGE_TOKEN};
pub use mock_solver::MockChallengeSolver;

/// Test fixtures and helper functions.
pub mod fixtures {
    use bytes::Bytes;
    use std::time::Duration;

    use crate::config::Config;
    use crate::upscale::PollPolicy;

    /// A small payload starting with the PNG signature.
    pub fn png_bytes() -> Bytes {
        Bytes::from_static(b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDRfixture")
    }

    /// Poll policy short enough for tests running on real time.
    pub fn fast_poll_policy() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts: 5,
        }
    }

    /// Default config with download sources limited to `hosts`.
    pub fn config_with_allowed_hosts(hosts: &[&str]) -> Config {
        let mut config = Config::default();
        config.download.allowed_hosts = hosts.iter().map(|h| h.to_string()).collect();
        config
    }
}
