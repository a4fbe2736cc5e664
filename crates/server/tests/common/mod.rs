//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with mock provider and solver injected, so the HTTP surface can be tested
//! without reaching any third-party service.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use upscaler_core::{
    testing::{MockChallengeSolver, MockUpscaleProvider},
    ChallengeSolver, Config, PollPolicy, ResultDownloader, UpscaleOrchestrator, UpscaleProvider,
};
use upscaler_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use upscaler_core::testing::fixtures;

const BOUNDARY: &str = "upscaler-test-boundary";

/// Test fixture for API testing with mock dependencies.
///
/// Provides an in-process server with fully controllable mocks for:
/// - Upscale provider (MockUpscaleProvider)
/// - Challenge solver (MockChallengeSolver)
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_upscale() {
///     let fixture = TestFixture::new().await;
///     fixture.provider.complete_after(1, "https://cdn.example/out.png").await;
///
///     let response = fixture
///         .post_multipart("/api/v1/upscale", &[Part::file("image", fixtures::png_bytes())])
///         .await;
///
///     assert_eq!(response.status, 200);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock provider - control task completion and failures
    pub provider: Arc<MockUpscaleProvider>,
    /// Mock solver
    pub solver: Arc<MockChallengeSolver>,
    /// Shutdown token shared with the app state
    pub shutdown: CancellationToken,
    /// Static UI directory
    pub static_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub bytes: Bytes,
    pub body: Value,
}

/// One multipart form part.
pub struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

impl Part {
    /// A file part, as a browser sends an `<input type="file">`.
    pub fn file(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            filename: Some("photo.png".to_string()),
            content_type: Some("image/png".to_string()),
            data: data.into(),
        }
    }

    /// A plain text form value.
    pub fn text(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            filename: None,
            content_type: None,
            data: value.as_bytes().to_vec(),
        }
    }

    /// A form value with arbitrary bytes, not necessarily UTF-8.
    pub fn raw(name: &str, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            filename: None,
            content_type: None,
            data: data.into(),
        }
    }
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match &part.filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    part.name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name).as_bytes(),
            ),
        }
        if let Some(content_type) = &part.content_type {
            body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(&part.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

impl TestFixture {
    /// Create a new test fixture with default config and fast polling.
    pub async fn new() -> Self {
        Self::with_config(Config::default(), fixtures::fast_poll_policy()).await
    }

    /// Create a test fixture whose download proxy may fetch from `hosts`.
    pub async fn with_allowed_hosts(hosts: &[&str]) -> Self {
        Self::with_config(
            fixtures::config_with_allowed_hosts(hosts),
            fixtures::fast_poll_policy(),
        )
        .await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(mut config: Config, policy: PollPolicy) -> Self {
        let static_dir = TempDir::new().expect("Failed to create temp dir");
        std::fs::write(
            static_dir.path().join("index.html"),
            "<!doctype html><title>Upscaler</title>",
        )
        .expect("Failed to write index.html");
        config.server.static_dir = static_dir.path().to_path_buf();

        let provider = Arc::new(MockUpscaleProvider::new());
        let solver = Arc::new(MockChallengeSolver::new());

        let orchestrator = Arc::new(UpscaleOrchestrator::new(
            Arc::clone(&provider) as Arc<dyn UpscaleProvider>,
            Arc::clone(&solver) as Arc<dyn ChallengeSolver>,
            policy,
        ));
        let downloader = Arc::new(
            ResultDownloader::new(config.download.clone()).expect("Failed to create downloader"),
        );
        let shutdown = CancellationToken::new();

        let state = Arc::new(AppState::new(
            config,
            orchestrator,
            downloader,
            shutdown.clone(),
        ));

        Self {
            router: create_router(state),
            provider,
            solver,
            shutdown,
            static_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and hand back the response with its body unread.
    pub async fn get_streaming(&self, path: &str) -> axum::response::Response {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request")
    }

    /// Send a request with arbitrary method and headers.
    pub async fn request(
        &self,
        method: &str,
        path: &str,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Send a POST request with a `multipart/form-data` body.
    pub async fn post_multipart(&self, path: &str, parts: &[Part]) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap();
        self.send(request).await
    }

    /// Send a POST request with custom content type (for testing wrong content types).
    pub async fn post_with_content_type(
        &self,
        path: &str,
        body: &str,
        content_type: &str,
    ) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };

        TestResponse {
            status,
            headers,
            bytes,
            body,
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}
