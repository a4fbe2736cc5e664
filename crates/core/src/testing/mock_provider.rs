//! Mock upscale provider for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::upscale::{
    ChallengeToken, CreationId, GenerationRequest, InvocationId, ResultGroup, ResultItem,
    ResultListing, SolvedChallenge, UploadSlot, UpscaleError, UpscaleProvider, UpscaleStep,
    STATUS_COMPLETE,
};

/// Token handed out by [`MockUpscaleProvider::exchange_challenge`].
pub const MOCK_CHALLENGE_TOKEN: &str = "mock-challenge-token";

/// A recorded provider call for test assertions.
#[derive(Debug, Clone)]
pub enum ProviderCall {
    RequestUploadSlot {
        identity: InvocationId,
    },
    UploadImage {
        put_url: String,
        bytes: usize,
    },
    ExchangeChallenge {
        identity: InvocationId,
        solved: String,
    },
    CreateTask {
        identity: InvocationId,
        token: String,
        request: GenerationRequest,
    },
    ListResults {
        identity: InvocationId,
    },
}

impl ProviderCall {
    /// Trait method name of the call.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestUploadSlot { .. } => "request_upload_slot",
            Self::UploadImage { .. } => "upload_image",
            Self::ExchangeChallenge { .. } => "exchange_challenge",
            Self::CreateTask { .. } => "create_task",
            Self::ListResults { .. } => "list_results",
        }
    }

    /// Identity header the call carried. Storage uploads carry none.
    pub fn identity(&self) -> Option<InvocationId> {
        match self {
            Self::RequestUploadSlot { identity }
            | Self::ExchangeChallenge { identity, .. }
            | Self::CreateTask { identity, .. }
            | Self::ListResults { identity } => Some(*identity),
            Self::UploadImage { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
enum SlotMode {
    /// A fresh slot per request.
    Generated,
    Fixed(UploadSlot),
    /// The provider answers with an empty slot list.
    Missing,
}

#[derive(Debug, Clone)]
struct Completion {
    after_polls: u32,
    /// `None` derives a distinct URL from the task.
    url: Option<String>,
}

/// Mock implementation of the [`UpscaleProvider`] trait.
///
/// Provides controllable behavior for testing:
/// - Tasks complete after a configured number of polls, or never
/// - Any step can be made to fail once
/// - Every call is recorded with its identity
///
/// # Example
///
/// ```rust,ignore
/// use upscaler_core::testing::MockUpscaleProvider;
///
/// let provider = MockUpscaleProvider::new();
/// provider.complete_after(3, "https://cdn.example/result.png").await;
///
/// // Run an orchestrator against it...
///
/// assert_eq!(provider.poll_count(&outcome.identity).await, 3);
/// ```
#[derive(Debug)]
pub struct MockUpscaleProvider {
    slot_mode: Arc<RwLock<SlotMode>>,
    completion: Arc<RwLock<Option<Completion>>>,
    /// One-shot failures, consumed by the first call at their step.
    failures: Arc<RwLock<Vec<(UpscaleStep, UpscaleError)>>>,
    calls: Arc<RwLock<Vec<ProviderCall>>>,
    polls: Arc<RwLock<HashMap<InvocationId, u32>>>,
    tasks: Arc<RwLock<HashMap<InvocationId, CreationId>>>,
    created: Arc<RwLock<Vec<GenerationRequest>>>,
    slots_issued: Arc<RwLock<u32>>,
}

impl Default for MockUpscaleProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockUpscaleProvider {
    /// Create a mock whose tasks never complete.
    pub fn new() -> Self {
        Self {
            slot_mode: Arc::new(RwLock::new(SlotMode::Generated)),
            completion: Arc::new(RwLock::new(None)),
            failures: Arc::new(RwLock::new(Vec::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
            polls: Arc::new(RwLock::new(HashMap::new())),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            created: Arc::new(RwLock::new(Vec::new())),
            slots_issued: Arc::new(RwLock::new(0)),
        }
    }

    /// Report completion with `url` on the `polls`-th poll of each identity.
    pub async fn complete_after(&self, polls: u32, url: impl Into<String>) {
        *self.completion.write().await = Some(Completion {
            after_polls: polls,
            url: Some(url.into()),
        });
    }

    /// Like [`complete_after`](Self::complete_after) with a distinct URL per task.
    pub async fn complete_after_unique(&self, polls: u32) {
        *self.completion.write().await = Some(Completion {
            after_polls: polls,
            url: None,
        });
    }

    /// Return `slot` for every credential request, or no slot at all.
    pub async fn set_upload_slot(&self, slot: Option<UploadSlot>) {
        *self.slot_mode.write().await = match slot {
            Some(slot) => SlotMode::Fixed(slot),
            None => SlotMode::Missing,
        };
    }

    /// Fail the next call at `step` with `error`.
    pub async fn fail_at(&self, step: UpscaleStep, error: UpscaleError) {
        self.failures.write().await.push((step, error));
    }

    /// All calls so far, in order.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.read().await.clone()
    }

    /// Result polls issued under `identity`.
    pub async fn poll_count(&self, identity: &InvocationId) -> u32 {
        self.polls.read().await.get(identity).copied().unwrap_or(0)
    }

    /// Generation requests that created a task.
    pub async fn created_tasks(&self) -> Vec<GenerationRequest> {
        self.created.read().await.clone()
    }

    async fn record(&self, call: ProviderCall) {
        self.calls.write().await.push(call);
    }

    async fn take_failure(&self, step: UpscaleStep) -> Result<(), UpscaleError> {
        let mut failures = self.failures.write().await;
        match failures.iter().position(|(s, _)| *s == step) {
            Some(index) => Err(failures.remove(index).1),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl UpscaleProvider for MockUpscaleProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request_upload_slot(
        &self,
        identity: &InvocationId,
    ) -> Result<UploadSlot, UpscaleError> {
        self.record(ProviderCall::RequestUploadSlot {
            identity: *identity,
        })
        .await;
        self.take_failure(UpscaleStep::Credentials).await?;

        match self.slot_mode.read().await.clone() {
            SlotMode::Fixed(slot) => Ok(slot),
            SlotMode::Missing => Err(UpscaleError::Credential(
                "provider returned no upload slot".to_string(),
            )),
            SlotMode::Generated => {
                let mut issued = self.slots_issued.write().await;
                *issued += 1;
                Ok(UploadSlot {
                    put: format!("https://storage.mock/write/{}.png", issued),
                    get: format!("https://storage.mock/read/{}.png", issued),
                })
            }
        }
    }

    async fn upload_image(&self, slot: &UploadSlot, image: Bytes) -> Result<(), UpscaleError> {
        self.record(ProviderCall::UploadImage {
            put_url: slot.put.clone(),
            bytes: image.len(),
        })
        .await;
        self.take_failure(UpscaleStep::Upload).await
    }

    async fn exchange_challenge(
        &self,
        identity: &InvocationId,
        solved: &SolvedChallenge,
    ) -> Result<ChallengeToken, UpscaleError> {
        self.record(ProviderCall::ExchangeChallenge {
            identity: *identity,
            solved: solved.0.clone(),
        })
        .await;
        self.take_failure(UpscaleStep::ChallengeExchange).await?;
        Ok(ChallengeToken(MOCK_CHALLENGE_TOKEN.to_string()))
    }

    async fn create_task(
        &self,
        identity: &InvocationId,
        token: &ChallengeToken,
        request: &GenerationRequest,
    ) -> Result<CreationId, UpscaleError> {
        self.record(ProviderCall::CreateTask {
            identity: *identity,
            token: token.0.clone(),
            request: request.clone(),
        })
        .await;
        self.take_failure(UpscaleStep::TaskCreation).await?;

        let mut created = self.created.write().await;
        created.push(request.clone());
        let creation_id = CreationId(format!("creation-{}", created.len()));
        self.tasks
            .write()
            .await
            .insert(*identity, creation_id.clone());
        Ok(creation_id)
    }

    async fn list_results(&self, identity: &InvocationId) -> Result<ResultListing, UpscaleError> {
        self.record(ProviderCall::ListResults {
            identity: *identity,
        })
        .await;
        let polls = {
            let mut polls = self.polls.write().await;
            let count = polls.entry(*identity).or_insert(0);
            *count += 1;
            *count
        };
        self.take_failure(UpscaleStep::Poll).await?;

        let item = match self.completion.read().await.clone() {
            Some(done) if polls >= done.after_polls => {
                let url = match done.url {
                    Some(url) => url,
                    None => {
                        let key = match self.tasks.read().await.get(identity) {
                            Some(creation_id) => creation_id.to_string(),
                            None => identity.to_string(),
                        };
                        format!("https://cdn.example/{}.png", key)
                    }
                };
                ResultItem {
                    status: Some(STATUS_COMPLETE),
                    url: Some(url),
                    creation_id: None,
                }
            }
            _ => ResultItem {
                status: Some(0),
                url: None,
                creation_id: None,
            },
        };

        Ok(ResultListing {
            groups: vec![ResultGroup {
                creation_id: None,
                items: vec![item],
            }],
        })
    }
}
