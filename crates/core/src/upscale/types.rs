//! Value types flowing through one upscale invocation.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::UpscaleError;

// ============================================================================
// Scale factor
// ============================================================================

/// Output resolution multiplier accepted by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub enum ScaleFactor {
    X1,
    X4,
    X8,
    X16,
}

impl ScaleFactor {
    /// Every scale the provider accepts, ascending.
    pub const ALL: [ScaleFactor; 4] = [Self::X1, Self::X4, Self::X8, Self::X16];

    /// Integer value sent to the provider.
    pub fn value(self) -> u32 {
        match self {
            Self::X1 => 1,
            Self::X4 => 4,
            Self::X8 => 8,
            Self::X16 => 16,
        }
    }

    /// Human readable allowed set, e.g. `1, 4, 8, 16`.
    pub fn allowed_list() -> String {
        Self::ALL
            .iter()
            .map(|s| s.value().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn rejection() -> UpscaleError {
        UpscaleError::InvalidInput(format!(
            "Available scale options: {}.",
            Self::allowed_list()
        ))
    }
}

impl TryFrom<i64> for ScaleFactor {
    type Error = UpscaleError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|s| i64::from(s.value()) == value)
            .ok_or_else(Self::rejection)
    }
}

impl FromStr for ScaleFactor {
    type Err = UpscaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: i64 = s.trim().parse().map_err(|_| Self::rejection())?;
        Self::try_from(value)
    }
}

impl From<ScaleFactor> for u32 {
    fn from(scale: ScaleFactor) -> Self {
        scale.value()
    }
}

impl fmt::Display for ScaleFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.value())
    }
}

// ============================================================================
// Inbound payload
// ============================================================================

/// Image payload as received from the inbound collaborator.
///
/// Only `Binary` is acceptable; a form part that arrived as text is carried
/// through so the orchestrator can reject it before any network call.
#[derive(Debug, Clone)]
pub enum ImageInput {
    Binary(Bytes),
    Text(String),
}

impl ImageInput {
    /// Extract the image bytes, rejecting text and empty payloads.
    pub fn into_bytes(self) -> Result<Bytes, UpscaleError> {
        match self {
            Self::Binary(bytes) if bytes.is_empty() => Err(UpscaleError::InvalidInput(
                "Image must be a non-empty buffer.".to_string(),
            )),
            Self::Binary(bytes) => Ok(bytes),
            Self::Text(_) => Err(UpscaleError::InvalidInput(
                "Image must be a buffer.".to_string(),
            )),
        }
    }
}

impl From<Bytes> for ImageInput {
    fn from(bytes: Bytes) -> Self {
        Self::Binary(bytes)
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(bytes))
    }
}

// ============================================================================
// Per-invocation identifiers
// ============================================================================

/// Correlation key generated once per invocation and sent on every provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for InvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Write/read URL pair for one uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSlot {
    /// Signed URL the raw bytes are PUT to.
    pub put: String,
    /// URL referencing the uploaded image in later calls.
    pub get: String,
}

/// Value returned by the challenge solver service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvedChallenge(pub String);

/// Provider-issued token authorizing task creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeToken(pub String);

/// Provider identifier of a generation task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CreationId(pub String);

impl fmt::Display for CreationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task parameters that vary per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Read URL of the uploaded source image.
    pub image_url: String,
    pub scale: ScaleFactor,
}

// ============================================================================
// Result listing
// ============================================================================

/// Status code the provider uses for a finished task.
pub const STATUS_COMPLETE: i64 = 1;

/// One page of the provider's result listing for an identity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultListing {
    pub groups: Vec<ResultGroup>,
}

/// A group of outputs, normally one per generation task.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultGroup {
    pub creation_id: Option<String>,
    pub items: Vec<ResultItem>,
}

/// One output entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultItem {
    pub status: Option<i64>,
    pub url: Option<String>,
    pub creation_id: Option<String>,
}

impl ResultItem {
    /// The result URL if this entry reports completion.
    pub fn completed_url(&self) -> Option<&str> {
        match (self.status, self.url.as_deref()) {
            (Some(STATUS_COMPLETE), Some(url)) if !url.is_empty() => Some(url),
            _ => None,
        }
    }
}

impl ResultListing {
    /// Locate the entry belonging to `creation_id`.
    ///
    /// Entries tagged with the creation id win; when the provider does not tag
    /// them, the first item of the first group is taken as the newest task.
    pub fn locate(&self, creation_id: &CreationId) -> Option<&ResultItem> {
        let wanted = creation_id.0.as_str();

        for group in &self.groups {
            if group.creation_id.as_deref() == Some(wanted) {
                return group.items.first();
            }
            if let Some(item) = group
                .items
                .iter()
                .find(|i| i.creation_id.as_deref() == Some(wanted))
            {
                return Some(item);
            }
        }

        let tagged = self.groups.iter().any(|g| {
            g.creation_id.is_some() || g.items.iter().any(|i| i.creation_id.is_some())
        });
        if tagged {
            // Tagged listing without our task: it has not shown up yet.
            if let Some(url) = self.unmatched_completion() {
                warn!(
                    %creation_id,
                    url,
                    "Listing holds a completed task under another creation id"
                );
            }
            return None;
        }

        self.groups.first().and_then(|g| g.items.first())
    }

    /// First completed URL anywhere in the listing.
    fn unmatched_completion(&self) -> Option<&str> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter())
            .find_map(ResultItem::completed_url)
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Successful result of one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct UpscaleOutcome {
    pub url: String,
    pub identity: InvocationId,
    pub creation_id: CreationId,
    pub scale: ScaleFactor,
    pub poll_attempts: u32,
    pub completed_at: DateTime<Utc>,
}
