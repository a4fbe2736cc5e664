//! Result download proxy handler.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, StatusCode},
    response::Response,
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use upscaler_core::DownloadError;

use crate::metrics::{DOWNLOAD_BYTES_TOTAL, DOWNLOAD_REJECTIONS};
use crate::state::AppState;

/// Filename offered to the browser.
const ATTACHMENT_FILENAME: &str = "upscaled-image.png";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DownloadErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

type ErrorReply = (StatusCode, Json<DownloadErrorResponse>);

fn rejection(err: &DownloadError, url: Option<String>) -> ErrorReply {
    let (status, reason) = match err {
        DownloadError::MissingUrl => (StatusCode::BAD_REQUEST, "missing_url"),
        DownloadError::InvalidSource => (StatusCode::BAD_REQUEST, "invalid_source"),
        DownloadError::TooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "too_large"),
        DownloadError::Http { .. } | DownloadError::Upstream(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "upstream")
        }
    };
    DOWNLOAD_REJECTIONS.with_label_values(&[reason]).inc();

    let body = match err {
        DownloadError::Http { .. } | DownloadError::Upstream(_) => DownloadErrorResponse {
            error: "Failed to download image".to_string(),
            details: Some(err.to_string()),
            url,
        },
        _ => DownloadErrorResponse {
            error: err.to_string(),
            details: None,
            url: None,
        },
    };
    (status, Json(body))
}

/// GET /api/v1/download?url=...
///
/// Stream a result image from an allowlisted host back to the browser as an
/// attachment.
pub async fn download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ErrorReply> {
    let raw = query.url.unwrap_or_default();
    let downloader = state.downloader();

    let image = match downloader.fetch(&raw).await {
        Ok(image) => image,
        Err(e) => {
            match &e {
                DownloadError::Http { .. } | DownloadError::Upstream(_) => {
                    error!(url = %raw, error = %e, "Download proxy fetch failed")
                }
                _ => warn!(url = %raw, error = %e, "Download request rejected"),
            }
            return Err(rejection(&e, Some(raw)));
        }
    };

    debug!(
        url = %raw,
        content_type = %image.content_type,
        content_length = ?image.content_length,
        "Proxying result image"
    );

    let content_type = image.content_type.clone();
    let content_length = image.content_length;
    let limit = downloader.max_bytes();
    let mut relayed: u64 = 0;

    // Bodies without a declared length are capped while streaming.
    let body_stream = image.into_inner().bytes_stream().map(move |chunk| {
        let chunk = chunk.map_err(std::io::Error::other)?;
        relayed += chunk.len() as u64;
        if relayed > limit {
            return Err(std::io::Error::other(format!(
                "Image exceeds limit of {} bytes",
                limit
            )));
        }
        DOWNLOAD_BYTES_TOTAL.inc_by(chunk.len() as u64);
        Ok(chunk)
    });

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", ATTACHMENT_FILENAME),
        )
        .header(header::CACHE_CONTROL, "public, max-age=3600");
    if let Some(length) = content_length {
        builder = builder.header(header::CONTENT_LENGTH, length);
    }

    builder.body(Body::from_stream(body_stream)).map_err(|e| {
        error!(error = %e, "Failed to build download response");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(DownloadErrorResponse {
                error: "Failed to download image".to_string(),
                details: Some(e.to_string()),
                url: None,
            }),
        )
    })
}
