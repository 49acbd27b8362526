//! HTTP client for webhook delivery with per-endpoint timeouts.
//!
//! Handles request construction, response processing, and error
//! categorization for the retry scheduler. The endpoint's own timeout is a
//! hard upper bound on each attempt, applied per request rather than per
//! client.

use std::{collections::HashMap, time::Duration};

use bytes::Bytes;
use hookline_core::{AttemptId, EventId, HttpMethod};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::error::{DeliveryError, Result};

/// Configuration for the webhook delivery client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// User agent string for requests.
    pub user_agent: String,
    /// Maximum number of redirects to follow.
    pub max_redirects: u32,
    /// Whether to verify TLS certificates.
    pub verify_tls: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: "Hookline-Delivery/1.0".to_string(),
            max_redirects: 3,
            verify_tls: true,
        }
    }
}

/// Request context for one delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// Identifier of the attempt being made.
    pub attempt_id: AttemptId,
    /// Event ID being delivered.
    pub event_id: EventId,
    /// Destination URL for the webhook.
    pub url: String,
    /// HTTP method configured on the endpoint.
    pub method: HttpMethod,
    /// Headers to attach, signature headers included.
    pub headers: HashMap<String, String>,
    /// JSON payload body.
    pub body: Bytes,
    /// Hard upper bound for this attempt.
    pub timeout: Duration,
    /// Attempt number for this delivery.
    pub attempt_number: u32,
}

/// Response from a webhook delivery attempt.
#[derive(Debug, Clone)]
pub struct DeliveryResponse {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body, truncated for audit storage.
    pub body: String,
    /// Total duration of the request.
    pub duration: Duration,
    /// Whether the request was successful (2xx status).
    pub is_success: bool,
}

/// HTTP client optimized for webhook delivery.
///
/// Uses connection pooling so many endpoints can be delivered to
/// concurrently. Non-2xx responses are returned as responses, not errors;
/// only transport failures produce a [`DeliveryError`].
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    client: reqwest::Client,
}

impl DeliveryClient {
    /// Creates a new delivery client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client
    /// cannot be built with the provided settings.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects as usize))
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// Creates a new delivery client with default configuration.
    pub fn with_defaults() -> Result<Self> {
        Self::new(&ClientConfig::default())
    }

    /// Sends one webhook delivery attempt.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Timeout` when the endpoint does not respond
    /// within the request timeout, and `DeliveryError::NetworkError` for
    /// connection-level failures. HTTP error statuses are not errors here.
    pub async fn send(&self, request: DeliveryRequest) -> Result<DeliveryResponse> {
        let start_time = std::time::Instant::now();

        let span = info_span!(
            "webhook_delivery",
            event_id = %request.event_id,
            attempt_id = %request.attempt_id,
            url = %request.url,
            attempt = request.attempt_number
        );

        async move {
            tracing::debug!(method = %request.method, "starting webhook delivery");

            let method = match request.method {
                HttpMethod::Post => reqwest::Method::POST,
                HttpMethod::Put => reqwest::Method::PUT,
                HttpMethod::Patch => reqwest::Method::PATCH,
            };

            let mut http_request = self
                .client
                .request(method, &request.url)
                .timeout(request.timeout)
                .body(request.body.clone())
                .header("content-type", "application/json");

            for (key, value) in &request.headers {
                if !is_managed_header(key) {
                    http_request = http_request.header(key, value);
                }
            }

            http_request = http_request
                .header("X-Hookline-Event-Id", request.event_id.to_string())
                .header("X-Hookline-Attempt", request.attempt_number.to_string());

            let response = match http_request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let duration = start_time.elapsed();
                    tracing::warn!(duration_ms = duration.as_millis(), "request failed: {}", e);

                    if e.is_timeout() {
                        return Err(DeliveryError::timeout(request.timeout.as_secs()));
                    }
                    if e.is_connect() {
                        return Err(DeliveryError::network(format!("connection failed: {e}")));
                    }
                    return Err(DeliveryError::network(e.to_string()));
                },
            };

            let duration = start_time.elapsed();
            let status_code = response.status().as_u16();
            let is_success = response.status().is_success();
            let headers = extract_headers(response.headers());
            let body = read_body(response).await;

            if is_success {
                tracing::info!(
                    status = status_code,
                    duration_ms = duration.as_millis(),
                    "webhook delivered"
                );
            } else {
                tracing::warn!(
                    status = status_code,
                    duration_ms = duration.as_millis(),
                    "endpoint rejected delivery"
                );
            }

            Ok(DeliveryResponse { status_code, headers, body, duration, is_success })
        }
        .instrument(span)
        .await
    }
}

/// Reads the response body, truncating oversized payloads for storage.
async fn read_body(response: reqwest::Response) -> String {
    const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;
    const MAX_AUDIT_SIZE: usize = 1024;

    match response.bytes().await {
        Ok(bytes) => {
            if bytes.len() > MAX_RESPONSE_BODY_SIZE {
                let suffix = "... (truncated)";
                let max_content = MAX_AUDIT_SIZE - suffix.len();
                let truncated = String::from_utf8_lossy(&bytes[..max_content]);
                format!("{truncated}{suffix}")
            } else {
                String::from_utf8_lossy(&bytes).into_owned()
            }
        },
        Err(e) => {
            tracing::warn!("failed to read response body: {}", e);
            format!("[failed to read response body: {e}]")
        },
    }
}

/// Extracts headers from reqwest HeaderMap into a standard HashMap.
fn extract_headers(header_map: &HeaderMap) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for (key, value) in header_map {
        if let Ok(value_str) = value.to_str() {
            headers.insert(key.to_string(), value_str.to_string());
        }
    }

    headers
}

/// Checks if a header is managed by the delivery system and must not be
/// overridden by endpoint-configured custom headers.
pub(crate) fn is_managed_header(header_name: &str) -> bool {
    let lowercase = header_name.to_lowercase();
    matches!(
        lowercase.as_str(),
        "content-length"
            | "content-type"
            | "host"
            | "user-agent"
            | "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn create_test_request(url: String) -> DeliveryRequest {
        let mut headers = HashMap::new();
        headers.insert("X-Custom-Header".to_string(), "test-value".to_string());

        DeliveryRequest {
            attempt_id: AttemptId::new(),
            event_id: EventId::new(),
            url,
            method: HttpMethod::Post,
            headers,
            body: Bytes::from(r#"{"ok":true}"#),
            timeout: Duration::from_secs(5),
            attempt_number: 1,
        }
    }

    #[tokio::test]
    async fn successful_delivery() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::path("/webhook"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/webhook", mock_server.uri()));

        let response = client.send(request).await.unwrap();
        assert_eq!(response.status_code, 200);
        assert!(response.is_success);
        assert_eq!(response.body, "OK");
    }

    #[tokio::test]
    async fn server_error_is_a_response_not_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let request = create_test_request(format!("{}/webhook", mock_server.uri()));

        let response = client.send(request).await.unwrap();
        assert_eq!(response.status_code, 503);
        assert!(!response.is_success);
    }

    #[tokio::test]
    async fn configured_method_used() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let mut request = create_test_request(mock_server.uri());
        request.method = HttpMethod::Put;

        assert!(client.send(request).await.unwrap().is_success);
    }

    #[tokio::test]
    async fn metadata_and_custom_headers_attached() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .and(matchers::header_exists("X-Hookline-Event-Id"))
            .and(matchers::header_exists("X-Hookline-Attempt"))
            .and(matchers::header("X-Custom-Header", "test-value"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let request = create_test_request(mock_server.uri());

        assert!(client.send(request).await.is_ok());
    }

    #[tokio::test]
    async fn timeout_reported_as_timeout_error() {
        let mock_server = MockServer::start().await;

        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let client = DeliveryClient::with_defaults().unwrap();
        let mut request = create_test_request(mock_server.uri());
        request.timeout = Duration::from_millis(100);

        match client.send(request).await {
            Err(DeliveryError::Timeout { .. }) => {},
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        let client = DeliveryClient::with_defaults().unwrap();
        // Port 9 (discard) is almost certainly closed.
        let request = create_test_request("http://127.0.0.1:9/webhook".to_string());

        match client.send(request).await {
            Err(DeliveryError::NetworkError { .. }) => {},
            other => panic!("expected network error, got {other:?}"),
        }
    }

    #[test]
    fn managed_headers_identified() {
        assert!(is_managed_header("Content-Length"));
        assert!(is_managed_header("content-type"));
        assert!(is_managed_header("Host"));
        assert!(is_managed_header("USER-AGENT"));

        assert!(!is_managed_header("X-Custom-Header"));
        assert!(!is_managed_header("Authorization"));
    }
}
