//! Delivery engine: executes one signed HTTP delivery attempt.
//!
//! The engine is deliberately infallible at its boundary. Whatever goes
//! wrong on the wire is folded into the returned attempt's outcome and
//! recorded in the ledger; callers never branch on transport errors.

use std::sync::Arc;

use bytes::Bytes;
use hookline_core::{Clock, DeliveryAttempt, Endpoint, Event, Store};

use crate::{
    client::{DeliveryClient, DeliveryRequest},
    error::DeliveryError,
    signing::{self, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};

/// Executes delivery attempts against endpoint snapshots.
///
/// Takes an [`Endpoint`] snapshot rather than an id so an attempt already
/// dispatched completes exactly as configured at dispatch time, even if the
/// endpoint is edited or removed mid-flight.
#[derive(Clone)]
pub struct DeliveryEngine {
    store: Store,
    client: DeliveryClient,
    clock: Arc<dyn Clock>,
}

impl DeliveryEngine {
    /// Creates an engine over the given store and client.
    pub fn new(store: Store, client: DeliveryClient, clock: Arc<dyn Clock>) -> Self {
        Self { store, client, clock }
    }

    /// Performs one delivery attempt and records it.
    ///
    /// Allocates the next attempt number for the (event, endpoint) pair,
    /// signs the payload when the endpoint has a signing secret, sends the
    /// request with the endpoint's method and timeout, then appends the
    /// resolved attempt to the ledger and bumps the endpoint's counters.
    pub async fn deliver(&self, endpoint: &Endpoint, event: &Event) -> DeliveryAttempt {
        let attempt_number =
            self.store.ledger.next_attempt_number(event.id, endpoint.id).await;
        let attempted_at = self.clock.now_utc();
        let pending = DeliveryAttempt::started(event, endpoint.id, attempt_number, attempted_at);

        let body = Bytes::from(event.payload_bytes());
        let mut headers = endpoint.headers.clone();

        if let Some(secret) = endpoint.signature_config.secret() {
            let signature = signing::sign_payload(secret, &body, attempted_at);
            let header = endpoint.signature_config.header().unwrap_or(SIGNATURE_HEADER);
            headers.insert(header.to_string(), signature.signature);
            headers.insert(TIMESTAMP_HEADER.to_string(), signature.timestamp);
            headers.insert(NONCE_HEADER.to_string(), signature.nonce);
        }

        let request = DeliveryRequest {
            attempt_id: pending.id,
            event_id: event.id,
            url: endpoint.url.clone(),
            method: endpoint.method,
            headers,
            body,
            timeout: endpoint.timeout,
            attempt_number,
        };

        let start = self.clock.now();
        let attempt = match self.client.send(request).await {
            Ok(response) => {
                if response.is_success {
                    pending.succeeded(response.status_code, response.duration)
                } else {
                    pending.failed(
                        Some(response.status_code),
                        response.duration,
                        format!("HTTP {}", response.status_code),
                    )
                }
            },
            Err(error) => {
                let latency = self.clock.now().saturating_duration_since(start);
                let message = match &error {
                    DeliveryError::Timeout { timeout_seconds } => {
                        format!("timed out after {timeout_seconds}s")
                    },
                    other => other.to_string(),
                };
                pending.failed(None, latency, message)
            },
        };

        self.store.endpoints.record_outcome(endpoint.id, attempt.is_success(), attempted_at).await;

        if let Err(e) = self.store.ledger.record(attempt.clone()).await {
            // Only possible if something else wrote this pair concurrently,
            // which the scheduler's single-open-attempt rule prevents.
            tracing::error!(
                event_id = %attempt.event_id,
                endpoint_id = %attempt.endpoint_id,
                attempt = attempt.attempt_number,
                "failed to record delivery attempt: {e}"
            );
        }

        attempt
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use hookline_core::{
        AttemptOutcome, EndpointConfig, RealClock, RegistryConfig, SignatureConfig,
    };
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn test_engine() -> DeliveryEngine {
        let store = Store::new(RegistryConfig::permissive(), Arc::new(RealClock));
        DeliveryEngine::new(store, DeliveryClient::with_defaults().unwrap(), Arc::new(RealClock))
    }

    #[tokio::test]
    async fn successful_attempt_recorded_in_ledger() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(EndpointConfig::new("crm", mock_server.uri(), ["user.created"]))
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::json!({"id": 7}));

        let attempt = engine.deliver(&endpoint, &event).await;
        assert!(attempt.is_success());
        assert_eq!(attempt.attempt_number, 1);
        assert_eq!(attempt.response_status, Some(200));

        let recorded = engine.store.ledger.attempts_for_pair(event.id, endpoint.id).await;
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].outcome, AttemptOutcome::Success);

        let refreshed = engine.store.endpoints.get(endpoint.id).await.unwrap();
        assert_eq!(refreshed.success_count, 1);
        assert!(refreshed.last_triggered_at.is_some());
    }

    #[tokio::test]
    async fn failed_attempt_carries_status_and_message() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(EndpointConfig::new("crm", mock_server.uri(), ["user.created"]))
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::Value::Null);

        let attempt = engine.deliver(&endpoint, &event).await;
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert_eq!(attempt.response_status, Some(500));
        assert_eq!(attempt.error_message.as_deref(), Some("HTTP 500"));

        let refreshed = engine.store.endpoints.get(endpoint.id).await.unwrap();
        assert_eq!(refreshed.failure_count, 1);
    }

    #[tokio::test]
    async fn connection_failure_has_no_status() {
        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(EndpointConfig::new("down", "http://127.0.0.1:9/hook", ["user.created"]))
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::Value::Null);

        let attempt = engine.deliver(&endpoint, &event).await;
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert_eq!(attempt.response_status, None);
        assert!(attempt.error_message.is_some());
    }

    #[tokio::test]
    async fn timeout_reported_with_sentinel_message() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(
                EndpointConfig::new("slow", mock_server.uri(), ["user.created"])
                    .with_timeout(Duration::from_millis(100)),
            )
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::Value::Null);

        let attempt = engine.deliver(&endpoint, &event).await;
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert_eq!(attempt.response_status, None);
        assert!(attempt.error_message.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn signed_delivery_verifiable_by_receiver() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .and(matchers::header_exists("X-Signature"))
            .and(matchers::header_exists("X-Hookline-Timestamp"))
            .and(matchers::header_exists("X-Hookline-Nonce"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(
                EndpointConfig::new("signed", mock_server.uri(), ["user.created"])
                    .with_signature(SignatureConfig::hmac_sha256("s3cret")),
            )
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::json!({"id": 1}));

        let attempt = engine.deliver(&endpoint, &event).await;
        assert!(attempt.is_success());

        // Replay verification against the captured request.
        let requests = mock_server.received_requests().await.unwrap();
        let request = &requests[0];
        let header = |name: &str| {
            request.headers.get(name).and_then(|v| v.to_str().ok()).unwrap().to_string()
        };
        assert!(signing::verify_signature(
            "s3cret",
            &request.body,
            &header("X-Hookline-Timestamp"),
            &header("X-Hookline-Nonce"),
            &header("X-Signature"),
        ));
        assert!(!signing::verify_signature(
            "wrong",
            &request.body,
            &header("X-Hookline-Timestamp"),
            &header("X-Hookline-Nonce"),
            &header("X-Signature"),
        ));
    }

    #[tokio::test]
    async fn attempt_numbers_increase_per_pair() {
        let mock_server = MockServer::start().await;
        Mock::given(matchers::method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let engine = test_engine();
        let endpoint = engine
            .store
            .endpoints
            .register(EndpointConfig::new("crm", mock_server.uri(), ["user.created"]))
            .await
            .unwrap();
        let event = Event::new("auth", "user.created", serde_json::Value::Null);

        for expected in 1..=3u32 {
            let attempt = engine.deliver(&endpoint, &event).await;
            assert_eq!(attempt.attempt_number, expected);
        }
    }
}
