//! Photo enhancer provider client over HTTP.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, ORIGIN, REFERER, USER_AGENT,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ConfigError, ProviderConfig};
use crate::metrics;

use super::traits::UpscaleProvider;
use super::types::{
    ChallengeToken, CreationId, GenerationRequest, InvocationId, ResultGroup, ResultItem,
    ResultListing, SolvedChallenge, UploadSlot,
};
use super::{UpscaleError, UpscaleStep};

const IDENTITY_HEADER: &str = "x-identity-id";
const CHALLENGE_HEADER: &str = "x-auth-challenge";
/// Challenge header value on calls that present no token.
const NO_CHALLENGE: &str = "";

const UPLOAD_TOKEN_PATH: &str = "/sys/oss/token";
const CHALLENGE_TOKEN_PATH: &str = "/sys/challenge/token";
const GENERATOR_PATH: &str = "/media/image/generator";
const RESULT_LIST_PATH: &str = "/media/aigc/result/list/v1";

/// Result listing page parameters; one page is enough for a fresh identity.
const RESULT_PAGE_NO: u32 = 1;
const RESULT_PAGE_SIZE: u32 = 10;

/// Longest upstream body quoted in an error message.
const BODY_EXCERPT_CHARS: usize = 200;

/// HTTP implementation of [`UpscaleProvider`].
pub struct HttpUpscaleProvider {
    client: Client,
    config: ProviderConfig,
    /// Fixed headers shared by every provider call.
    base_headers: HeaderMap,
}

impl HttpUpscaleProvider {
    /// Create a new provider client.
    pub fn new(config: ProviderConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("provider HTTP client: {}", e)))?;

        let mut base_headers = HeaderMap::new();
        base_headers.insert(AUTHORIZATION, HeaderValue::from_static("null"));
        base_headers.insert(ORIGIN, header_value("provider.origin", &config.origin)?);
        base_headers.insert(REFERER, header_value("provider.referer", &config.referer)?);
        base_headers.insert(
            USER_AGENT,
            header_value("provider.user_agent", &config.user_agent)?,
        );

        Ok(Self {
            client,
            config,
            base_headers,
        })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }

    /// Start a provider request carrying the fixed headers, the identity and
    /// the challenge header (empty unless a token is presented).
    fn session_request(
        &self,
        method: Method,
        path: &str,
        identity: &InvocationId,
        challenge: &str,
    ) -> RequestBuilder {
        let url = format!("{}{}", self.base_url(), path);
        self.client
            .request(method, url)
            .headers(self.base_headers.clone())
            .header(IDENTITY_HEADER, identity.to_string())
            .header(CHALLENGE_HEADER, challenge)
    }

    /// Send a provider request and decode its JSON body, recording metrics.
    async fn send_json<T: DeserializeOwned>(
        &self,
        step: UpscaleStep,
        endpoint: &'static str,
        request: RequestBuilder,
    ) -> Result<T, UpscaleError> {
        let started = Instant::now();
        let result = match fetch_body(step, request).await {
            Ok(body) => decode_body(step, &body),
            Err(e) => Err(e),
        };
        metrics::observe_external(
            "provider",
            endpoint,
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    /// PUT the bytes to object storage; the signed URL carries the authorization.
    async fn put_bytes(&self, slot: &UploadSlot, image: Bytes) -> Result<(), UpscaleError> {
        let response = self
            .client
            .put(&slot.put)
            .header(CONTENT_TYPE, "image/png")
            .body(image)
            .send()
            .await
            .map_err(|e| UpscaleError::network(UpscaleStep::Upload, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpscaleError::Upload(format!(
                "HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UpscaleProvider for HttpUpscaleProvider {
    fn name(&self) -> &str {
        "http"
    }

    async fn request_upload_slot(
        &self,
        identity: &InvocationId,
    ) -> Result<UploadSlot, UpscaleError> {
        debug!(%identity, "Requesting upload slot");

        let request = self
            .session_request(Method::GET, UPLOAD_TOKEN_PATH, identity, NO_CHALLENGE)
            .query(&[("f_suffix", "png"), ("get_num", "1"), ("unsafe", "1")]);

        let envelope: Envelope<Vec<WireSlot>> = self
            .send_json(UpscaleStep::Credentials, "upload_token", request)
            .await?;

        let slot = envelope
            .data
            .and_then(|slots| slots.into_iter().next())
            .ok_or_else(|| {
                UpscaleError::Credential("response contained no upload slot".to_string())
            })?;

        match (non_empty(slot.put), non_empty(slot.get)) {
            (Some(put), Some(get)) => Ok(UploadSlot { put, get }),
            _ => Err(UpscaleError::Credential(
                "upload slot is missing its put or get url".to_string(),
            )),
        }
    }

    async fn upload_image(&self, slot: &UploadSlot, image: Bytes) -> Result<(), UpscaleError> {
        debug!(bytes = image.len(), "Uploading image to storage");

        let started = Instant::now();
        let result = self.put_bytes(slot, image).await;
        metrics::observe_external(
            "storage",
            "put",
            started.elapsed().as_secs_f64(),
            result.is_ok(),
        );
        result
    }

    async fn exchange_challenge(
        &self,
        identity: &InvocationId,
        solved: &SolvedChallenge,
    ) -> Result<ChallengeToken, UpscaleError> {
        debug!(%identity, "Exchanging solved challenge");

        let request = self
            .session_request(Method::GET, CHALLENGE_TOKEN_PATH, identity, &solved.0);

        let envelope: Envelope<WireChallenge> = self
            .send_json(UpscaleStep::ChallengeExchange, "challenge_token", request)
            .await?;

        envelope
            .data
            .and_then(|d| non_empty(d.challenge_token))
            .map(ChallengeToken)
            .ok_or_else(|| {
                UpscaleError::ChallengeExchange(
                    "response contained no challenge_token".to_string(),
                )
            })
    }

    async fn create_task(
        &self,
        identity: &InvocationId,
        token: &ChallengeToken,
        request: &GenerationRequest,
    ) -> Result<CreationId, UpscaleError> {
        debug!(%identity, scale = %request.scale, "Creating generation task");

        let identity_id = identity.to_string();
        let body = CreateTaskBody {
            aigc_app_code: &self.config.app_code,
            model_code: &self.config.model_code,
            image_urls: [request.image_url.as_str()],
            extra_params: ExtraParams {
                scale: request.scale.value(),
            },
            currency_type: &self.config.currency_type,
            identity_id: &identity_id,
        };

        let http_request = self
            .session_request(Method::POST, GENERATOR_PATH, identity, &token.0)
            .json(&body);

        let envelope: Envelope<WireCreation> = self
            .send_json(UpscaleStep::TaskCreation, "generator", http_request)
            .await?;

        envelope
            .data
            .and_then(|d| d.creation_id.as_ref().and_then(id_string))
            .map(CreationId)
            .ok_or_else(|| {
                UpscaleError::TaskCreation("response contained no creation_id".to_string())
            })
    }

    async fn list_results(&self, identity: &InvocationId) -> Result<ResultListing, UpscaleError> {
        let identity_id = identity.to_string();
        let request = self
            .session_request(Method::GET, RESULT_LIST_PATH, identity, NO_CHALLENGE)
            .query(&[
                ("page_no", RESULT_PAGE_NO.to_string()),
                ("page_size", RESULT_PAGE_SIZE.to_string()),
                ("identity_id", identity_id),
            ]);

        let started = Instant::now();
        let body = fetch_body(UpscaleStep::Poll, request).await;
        metrics::observe_external(
            "provider",
            "result_list",
            started.elapsed().as_secs_f64(),
            body.is_ok(),
        );

        // Anything short of a transport or status failure is "not listed yet".
        Ok(listing_from_body(&body?))
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|e| {
        ConfigError::ValidationError(format!("{} is not a valid header: {}", field, e))
    })
}

async fn fetch_body(step: UpscaleStep, request: RequestBuilder) -> Result<Bytes, UpscaleError> {
    let response = request
        .send()
        .await
        .map_err(|e| UpscaleError::network(step, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(%step, status = status.as_u16(), "Provider returned an error status");
        return Err(UpscaleError::for_step(
            step,
            format!("HTTP {}: {}", status.as_u16(), excerpt(&body)),
        ));
    }

    response
        .bytes()
        .await
        .map_err(|e| UpscaleError::network(step, e))
}

fn decode_body<T: DeserializeOwned>(step: UpscaleStep, body: &[u8]) -> Result<T, UpscaleError> {
    serde_json::from_slice(body)
        .map_err(|e| UpscaleError::for_step(step, format!("unexpected response body: {}", e)))
}

/// Read `data.list[*].list[*]` without trusting the shape of any level.
fn listing_from_body(body: &[u8]) -> ResultListing {
    let value: Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(e) => {
            debug!(error = %e, "Result listing is not JSON, treating as pending");
            return ResultListing::default();
        }
    };

    let groups = value
        .pointer("/data/list")
        .and_then(Value::as_array)
        .map(|groups| groups.iter().map(group_from_value).collect())
        .unwrap_or_default();

    ResultListing { groups }
}

fn group_from_value(group: &Value) -> ResultGroup {
    ResultGroup {
        creation_id: group.get("creation_id").and_then(id_string),
        items: group
            .get("list")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(item_from_value).collect())
            .unwrap_or_default(),
    }
}

fn item_from_value(item: &Value) -> ResultItem {
    ResultItem {
        status: item.get("status").and_then(|s| match s {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }),
        url: item
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string),
        creation_id: item.get("creation_id").and_then(id_string),
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT_CHARS).collect()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Identifiers come back as strings or numbers depending on the endpoint.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ============================================================================
// Provider API wire types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct WireSlot {
    put: Option<String>,
    get: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChallenge {
    challenge_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCreation {
    creation_id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct CreateTaskBody<'a> {
    aigc_app_code: &'a str,
    model_code: &'a str,
    image_urls: [&'a str; 1],
    extra_params: ExtraParams,
    currency_type: &'a str,
    identity_id: &'a str,
}

#[derive(Debug, Serialize)]
struct ExtraParams {
    scale: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upscale::ScaleFactor;
    use mockito::Matcher;
    use serde_json::json;

    fn provider_for(server: &mockito::Server) -> HttpUpscaleProvider {
        HttpUpscaleProvider::new(ProviderConfig {
            base_url: format!("{}/api/", server.url()),
            timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_upload_slot_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let identity = InvocationId::generate();

        let mock = server
            .mock("GET", "/api/sys/oss/token")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("f_suffix".into(), "png".into()),
                Matcher::UrlEncoded("get_num".into(), "1".into()),
                Matcher::UrlEncoded("unsafe".into(), "1".into()),
            ]))
            .match_header("x-identity-id", identity.to_string().as_str())
            .match_header("x-auth-challenge", "")
            .match_header("authorization", "null")
            .match_header("referer", "https://supawork.ai/ai-photo-enhancer")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({"data": [{
                    "put": "https://bucket/put?sig=1",
                    "get": "https://bucket/a.png"
                }]})
                .to_string(),
            )
            .create_async()
            .await;

        let slot = provider_for(&server)
            .request_upload_slot(&identity)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(slot.put, "https://bucket/put?sig=1");
        assert_eq!(slot.get, "https://bucket/a.png");
    }

    #[tokio::test]
    async fn test_upload_slot_empty_list_is_credential_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/sys/oss/token")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": []}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .request_upload_slot(&InvocationId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::Credential(_)));
    }

    #[tokio::test]
    async fn test_upload_slot_http_error_is_credential_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/sys/oss/token")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = provider_for(&server)
            .request_upload_slot(&InvocationId::generate())
            .await
            .unwrap_err();
        match err {
            UpscaleError::Credential(msg) => assert_eq!(msg, "HTTP 500: boom"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_puts_png_bytes() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/bucket/object.png")
            .match_header("content-type", "image/png")
            .match_body("png-bytes")
            .with_status(200)
            .create_async()
            .await;

        let slot = UploadSlot {
            put: format!("{}/bucket/object.png", server.url()),
            get: "https://bucket/object.png".to_string(),
        };
        provider_for(&server)
            .upload_image(&slot, Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_rejected_is_upload_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("PUT", "/bucket/object.png")
            .with_status(403)
            .with_body("SignatureDoesNotMatch")
            .create_async()
            .await;

        let slot = UploadSlot {
            put: format!("{}/bucket/object.png", server.url()),
            get: String::new(),
        };
        let err = provider_for(&server)
            .upload_image(&slot, Bytes::from_static(b"png"))
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::Upload(ref m) if m.contains("403")));
    }

    #[tokio::test]
    async fn test_exchange_challenge_presents_solution() {
        let mut server = mockito::Server::new_async().await;
        let identity = InvocationId::generate();
        let mock = server
            .mock("GET", "/api/sys/challenge/token")
            .match_header("x-auth-challenge", "solved-value")
            .match_header("x-identity-id", identity.to_string().as_str())
            .with_status(200)
            .with_body(r#"{"data": {"challenge_token": "server-token"}}"#)
            .create_async()
            .await;

        let token = provider_for(&server)
            .exchange_challenge(&identity, &SolvedChallenge("solved-value".into()))
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(token, ChallengeToken("server-token".into()));
    }

    #[tokio::test]
    async fn test_exchange_challenge_missing_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/sys/challenge/token")
            .with_status(200)
            .with_body(r#"{"code": 1001, "data": null}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .exchange_challenge(&InvocationId::generate(), &SolvedChallenge("x".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::ChallengeExchange(_)));
    }

    #[tokio::test]
    async fn test_create_task_body() {
        let mut server = mockito::Server::new_async().await;
        let identity = InvocationId::generate();
        let mock = server
            .mock("POST", "/api/media/image/generator")
            .match_header("x-auth-challenge", "server-token")
            .match_body(Matcher::Json(json!({
                "aigc_app_code": "image_enhancer",
                "model_code": "supawork-ai",
                "image_urls": ["https://bucket/a.png"],
                "extra_params": {"scale": 8},
                "currency_type": "silver",
                "identity_id": identity.to_string(),
            })))
            .with_status(200)
            .with_body(r#"{"data": {"creation_id": 987654}}"#)
            .create_async()
            .await;

        let creation_id = provider_for(&server)
            .create_task(
                &identity,
                &ChallengeToken("server-token".into()),
                &GenerationRequest {
                    image_url: "https://bucket/a.png".into(),
                    scale: ScaleFactor::X8,
                },
            )
            .await
            .unwrap();
        mock.assert_async().await;
        assert_eq!(creation_id, CreationId("987654".into()));
    }

    #[tokio::test]
    async fn test_create_task_missing_id() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/media/image/generator")
            .with_status(200)
            .with_body(r#"{"data": {}}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .create_task(
                &InvocationId::generate(),
                &ChallengeToken("t".into()),
                &GenerationRequest {
                    image_url: "u".into(),
                    scale: ScaleFactor::X4,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, UpscaleError::TaskCreation(_)));
    }

    #[tokio::test]
    async fn test_list_results_parses_nested_listing() {
        let mut server = mockito::Server::new_async().await;
        let identity = InvocationId::generate();
        let mock = server
            .mock("GET", "/api/media/aigc/result/list/v1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("page_no".into(), "1".into()),
                Matcher::UrlEncoded("page_size".into(), "10".into()),
                Matcher::UrlEncoded("identity_id".into(), identity.to_string()),
            ]))
            .with_status(200)
            .with_body(
                json!({"data": {"list": [
                    {"creation_id": 42, "list": [{"status": 1, "url": "https://cdn/r.png"}]},
                    {"list": [{"status": "0", "url": null}]}
                ]}})
                .to_string(),
            )
            .create_async()
            .await;

        let listing = provider_for(&server).list_results(&identity).await.unwrap();
        mock.assert_async().await;

        assert_eq!(listing.groups.len(), 2);
        assert_eq!(listing.groups[0].creation_id.as_deref(), Some("42"));
        assert_eq!(listing.groups[0].items[0].completed_url(), Some("https://cdn/r.png"));
        assert_eq!(listing.groups[1].items[0].status, Some(0));
    }

    #[tokio::test]
    async fn test_list_results_without_data_is_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/media/aigc/result/list/v1")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data": {"list": null}}"#)
            .create_async()
            .await;

        let listing = provider_for(&server)
            .list_results(&InvocationId::generate())
            .await
            .unwrap();
        assert!(listing.groups.is_empty());
    }

    #[tokio::test]
    async fn test_list_results_unexpected_shapes_are_pending() {
        let bodies = [
            r#"{"code": 0, "data": []}"#,
            r#"{"data": {"list": {}}}"#,
            r#"{"data": {"list": [{"list": [{"status": 1, "url": false}]}]}}"#,
            "<html>busy</html>",
        ];

        for body in bodies {
            let mut server = mockito::Server::new_async().await;
            server
                .mock("GET", "/api/media/aigc/result/list/v1")
                .match_query(Matcher::Any)
                .match_header("x-auth-challenge", "")
                .with_status(200)
                .with_body(body)
                .create_async()
                .await;

            let listing = provider_for(&server)
                .list_results(&InvocationId::generate())
                .await
                .unwrap();
            assert!(
                listing.groups.iter().all(|g| g
                    .items
                    .iter()
                    .all(|i| i.completed_url().is_none())),
                "body {body} produced a completed item"
            );
        }
    }

    #[tokio::test]
    async fn test_list_results_http_error_aborts() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/media/aigc/result/list/v1")
            .match_query(Matcher::Any)
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let err = provider_for(&server)
            .list_results(&InvocationId::generate())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpscaleError::Network {
                step: UpscaleStep::Poll,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_connection_failure_is_network_error() {
        let provider = HttpUpscaleProvider::new(ProviderConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        })
        .unwrap();

        let err = provider
            .request_upload_slot(&InvocationId::generate())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            UpscaleError::Network {
                step: UpscaleStep::Credentials,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_header_config_rejected() {
        let result = HttpUpscaleProvider::new(ProviderConfig {
            referer: "bad\nvalue".to_string(),
            ..Default::default()
        });
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }
}
