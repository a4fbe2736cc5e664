//! Seams to the remote services, implemented over HTTP and by test mocks.

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{
    ChallengeToken, CreationId, GenerationRequest, InvocationId, ResultListing, SolvedChallenge,
    UploadSlot,
};
use super::UpscaleError;

/// The photo enhancer API.
///
/// Every call that talks to the provider itself carries the invocation
/// identity; the byte upload goes to object storage and does not.
#[async_trait]
pub trait UpscaleProvider: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Request one upload slot for a PNG object.
    async fn request_upload_slot(
        &self,
        identity: &InvocationId,
    ) -> Result<UploadSlot, UpscaleError>;

    /// PUT the raw image bytes to the slot's write URL.
    async fn upload_image(&self, slot: &UploadSlot, image: Bytes) -> Result<(), UpscaleError>;

    /// Trade a solved challenge for a provider challenge token.
    async fn exchange_challenge(
        &self,
        identity: &InvocationId,
        solved: &SolvedChallenge,
    ) -> Result<ChallengeToken, UpscaleError>;

    /// Submit a generation task.
    async fn create_task(
        &self,
        identity: &InvocationId,
        token: &ChallengeToken,
        request: &GenerationRequest,
    ) -> Result<CreationId, UpscaleError>;

    /// Fetch the first page of results for the identity.
    async fn list_results(&self, identity: &InvocationId) -> Result<ResultListing, UpscaleError>;
}

/// Third-party anti-bot challenge solver.
#[async_trait]
pub trait ChallengeSolver: Send + Sync {
    fn name(&self) -> &str;

    /// Solve the challenge protecting the provider page.
    async fn solve(&self) -> Result<SolvedChallenge, UpscaleError>;
}
