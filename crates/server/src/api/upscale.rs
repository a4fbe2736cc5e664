//! Upscale API handler.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{multipart::Field, Multipart, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};

use upscaler_core::{ImageInput, UpscaleError};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct UpscaleResponse {
    pub success: bool,
    /// Result image URL on the provider's CDN.
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct UpscaleErrorResponse {
    pub success: bool,
    pub error: String,
    /// Stable error tag, e.g. `invalid_input` or `poll_timeout`.
    pub kind: String,
}

type ErrorReply = (StatusCode, Json<UpscaleErrorResponse>);

fn error_reply(status: StatusCode, kind: &str, error: impl Into<String>) -> ErrorReply {
    (
        status,
        Json(UpscaleErrorResponse {
            success: false,
            error: error.into(),
            kind: kind.to_string(),
        }),
    )
}

/// HTTP status for an upscale failure.
///
/// `shutting_down` tells a cancellation caused by server shutdown apart from
/// one caused by the request deadline.
pub fn status_for(err: &UpscaleError, shutting_down: bool) -> StatusCode {
    match err {
        UpscaleError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        UpscaleError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        UpscaleError::Cancelled { .. } if shutting_down => StatusCode::SERVICE_UNAVAILABLE,
        UpscaleError::Cancelled { .. } => StatusCode::GATEWAY_TIMEOUT,
        UpscaleError::Credential(_)
        | UpscaleError::Upload(_)
        | UpscaleError::ChallengeSolve(_)
        | UpscaleError::ChallengeExchange(_)
        | UpscaleError::TaskCreation(_)
        | UpscaleError::Network { .. } => StatusCode::BAD_GATEWAY,
    }
}

// ============================================================================
// Form Parsing
// ============================================================================

/// Parsed `multipart/form-data` body.
#[derive(Debug, Default)]
struct UpscaleForm {
    image: Option<ImageInput>,
    scale: Option<String>,
}

/// A part uploaded as a file is binary; a plain form value is text.
fn is_file_part(field: &Field<'_>) -> bool {
    field.file_name().is_some()
        || field
            .content_type()
            .is_some_and(|ct| !ct.starts_with("text/"))
}

async fn read_form(mut multipart: Multipart) -> Result<UpscaleForm, ErrorReply> {
    let mut form = UpscaleForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                return Err(error_reply(
                    StatusCode::BAD_REQUEST,
                    "invalid_input",
                    format!("Malformed form data: {}", e),
                ))
            }
        };

        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "image" => {
                let binary = is_file_part(&field);
                let bytes: Bytes = field.bytes().await.map_err(|e| {
                    error_reply(
                        StatusCode::BAD_REQUEST,
                        "invalid_input",
                        format!("Failed to read image: {}", e),
                    )
                })?;
                form.image = Some(if binary {
                    ImageInput::Binary(bytes)
                } else {
                    ImageInput::Text(String::from_utf8_lossy(&bytes).into_owned())
                });
            }
            "scale" => {
                let bytes = field.bytes().await.map_err(|e| {
                    error_reply(
                        StatusCode::BAD_REQUEST,
                        "invalid_input",
                        format!("Failed to read scale: {}", e),
                    )
                })?;
                // Undecodable bytes stay in the value so scale parsing rejects it.
                let text = String::from_utf8_lossy(&bytes);
                let text = text.trim();
                if !text.is_empty() {
                    form.scale = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/upscale
///
/// Upscale the uploaded `image` by `scale` (default from config) and return
/// the result URL. Blocks until the provider finishes, the request deadline
/// passes or the server shuts down.
pub async fn upscale(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UpscaleResponse>, ErrorReply> {
    let form = read_form(multipart).await?;

    let Some(image) = form.image else {
        return Err(error_reply(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            "No image provided",
        ));
    };

    // Child of the shutdown token, additionally cancelled at the deadline.
    let cancel = state.shutdown_token().child_token();
    let deadline = Duration::from_secs(state.config().upscale.request_timeout_secs);
    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            cancel.cancel();
        })
    };

    let result = state
        .orchestrator()
        .upscale_input(
            image,
            form.scale.as_deref(),
            state.default_scale(),
            &cancel,
        )
        .await;
    timer.abort();

    match result {
        Ok(outcome) => {
            info!(
                identity = %outcome.identity,
                creation_id = %outcome.creation_id,
                polls = outcome.poll_attempts,
                "Upscale request served"
            );
            Ok(Json(UpscaleResponse {
                success: true,
                url: outcome.url,
            }))
        }
        Err(e) => {
            let shutting_down = state.shutdown_token().is_cancelled();
            let status = status_for(&e, shutting_down);

            if matches!(e, UpscaleError::Cancelled { .. }) && !shutting_down {
                warn!(deadline_secs = deadline.as_secs(), "Upscale request deadline exceeded");
                return Err(error_reply(
                    status,
                    "deadline_exceeded",
                    format!(
                        "Upscale did not finish within {} seconds. Please try again.",
                        deadline.as_secs()
                    ),
                ));
            }

            Err(error_reply(status, e.kind(), e.to_string()))
        }
    }
}
