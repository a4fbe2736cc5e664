//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Upscale invocations (outcome, duration, poll attempts)
//! - External services (provider, solver, download source)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Upscale Metrics
// =============================================================================

/// Upscale invocations by result.
pub static UPSCALE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("upscaler_upscale_requests_total", "Total upscale invocations"),
        &["result"], // "success" or an error kind
    )
    .unwrap()
});

/// Upscale invocation duration in seconds.
pub static UPSCALE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "upscaler_upscale_duration_seconds",
            "Duration of a full upscale invocation",
        )
        .buckets(vec![1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0, 90.0, 120.0]),
        &["result"],
    )
    .unwrap()
});

/// Result polls needed per invocation.
pub static POLL_ATTEMPTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "upscaler_poll_attempts",
            "Number of result polls per invocation",
        )
        .buckets(vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 30.0, 45.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// External service request duration in seconds.
pub static EXTERNAL_SERVICE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "upscaler_external_request_duration_seconds",
            "Duration of calls to external services",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["service", "endpoint"],
    )
    .unwrap()
});

/// External service requests by result.
pub static EXTERNAL_SERVICE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "upscaler_external_requests_total",
            "Total calls to external services",
        ),
        &["service", "endpoint", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Record one external call.
pub fn observe_external(service: &str, endpoint: &str, seconds: f64, success: bool) {
    EXTERNAL_SERVICE_DURATION
        .with_label_values(&[service, endpoint])
        .observe(seconds);
    EXTERNAL_SERVICE_REQUESTS
        .with_label_values(&[service, endpoint, if success { "success" } else { "error" }])
        .inc();
}

/// All core metrics, for registration in the server registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Upscale
        Box::new(UPSCALE_REQUESTS.clone()),
        Box::new(UPSCALE_DURATION.clone()),
        Box::new(POLL_ATTEMPTS.clone()),
        // External services
        Box::new(EXTERNAL_SERVICE_DURATION.clone()),
        Box::new(EXTERNAL_SERVICE_REQUESTS.clone()),
    ]
}
