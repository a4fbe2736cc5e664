//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the upscaler server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Download proxy throughput
//! - Core upscale and external service metrics (re-registered here)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "upscaler_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("upscaler_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "upscaler_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Download Proxy Metrics
// =============================================================================

/// Bytes relayed by the download proxy.
pub static DOWNLOAD_BYTES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "upscaler_download_bytes_total",
        "Total bytes streamed through the download proxy",
    )
    .unwrap()
});

/// Download proxy rejections by reason.
pub static DOWNLOAD_REJECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "upscaler_download_rejections_total",
            "Download requests refused before streaming",
        ),
        &["reason"], // "missing_url", "invalid_source", "too_large", "upstream"
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Download proxy
    registry
        .register(Box::new(DOWNLOAD_BYTES_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(DOWNLOAD_REJECTIONS.clone()))
        .unwrap();

    // Core metrics (upscale invocations, external services)
    for metric in upscaler_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Normalize a path for metric labels.
///
/// API routes keep their path; everything served from the static directory
/// collapses to one label.
pub fn normalize_path(path: &str) -> String {
    if path.starts_with("/api/") || path == "/metrics" {
        path.trim_end_matches('/').to_string()
    } else {
        "/static".to_string()
    }
}
