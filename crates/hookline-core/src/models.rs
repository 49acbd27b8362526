//! Core domain models and strongly-typed identifiers.
//!
//! Defines endpoints, events, delivery attempts, and newtype ID wrappers for
//! compile-time type safety. Delivery lifecycle state is modeled as a closed
//! enum so invalid transitions cannot be expressed.

use std::{collections::HashMap, fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default HTTP timeout applied to endpoints that do not configure one.
pub const DEFAULT_ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

/// Strongly-typed event identifier.
///
/// Wraps a UUID to prevent mixing with other ID types. Events are immutable
/// once accepted, and this ID follows them through their entire lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EventId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed endpoint identifier.
///
/// Each endpoint represents a unique webhook destination URL with its own
/// delivery configuration. Ledger entries reference endpoints by this ID
/// only, never by live pointer, so endpoint deletion leaves the audit trail
/// intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub Uuid);

impl EndpointId {
    /// Creates a new random endpoint ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for EndpointId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Strongly-typed delivery attempt identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Creates a new random attempt ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// HTTP methods supported for webhook delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    /// HTTP POST method (default).
    #[default]
    Post,
    /// HTTP PUT method.
    Put,
    /// HTTP PATCH method.
    Patch,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Patch => write!(f, "PATCH"),
        }
    }
}

/// Webhook signature configuration using tagged union pattern.
///
/// Ensures signing secret and header name are always configured together
/// when signatures are enabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum SignatureConfig {
    /// Deliveries are not signed.
    #[serde(rename = "none")]
    #[default]
    None,
    /// HMAC-SHA256 signature with custom header.
    #[serde(rename = "hmac_sha256")]
    HmacSha256 {
        /// Secret key for HMAC generation.
        secret: String,
        /// Header name carrying the signature.
        header: String,
    },
}

impl SignatureConfig {
    /// Create HMAC SHA256 signature config with the default header.
    pub fn hmac_sha256(secret: impl Into<String>) -> Self {
        Self::HmacSha256 { secret: secret.into(), header: "X-Signature".to_string() }
    }

    /// Create HMAC SHA256 signature config with a custom header.
    pub fn hmac_sha256_with_header(secret: impl Into<String>, header: impl Into<String>) -> Self {
        Self::HmacSha256 { secret: secret.into(), header: header.into() }
    }

    /// Check if signing is enabled.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Get the signing secret if configured.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::HmacSha256 { secret, .. } => Some(secret),
        }
    }

    /// Get the signature header name if configured.
    pub fn header(&self) -> Option<&str> {
        match self {
            Self::None => None,
            Self::HmacSha256 { header, .. } => Some(header),
        }
    }
}

/// Endpoint definition supplied at registration or edit time.
///
/// Validated by the registry before an [`Endpoint`] is created from it:
/// the URL must be absolute (HTTPS in production mode), the event-type set
/// non-empty, and the timeout greater than zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Human-readable endpoint name.
    pub name: String,
    /// Target URL for webhook delivery.
    pub url: String,
    /// HTTP method used for delivery.
    pub method: HttpMethod,
    /// Event types this endpoint subscribes to.
    pub event_types: Vec<String>,
    /// Signature configuration for outbound payloads.
    pub signature_config: SignatureConfig,
    /// Custom headers attached to every delivery.
    pub headers: HashMap<String, String>,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
}

impl EndpointConfig {
    /// Creates a definition with defaults: POST, unsigned, no custom
    /// headers, 30s timeout.
    pub fn new<I, S>(name: impl Into<String>, url: impl Into<String>, event_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            url: url.into(),
            method: HttpMethod::default(),
            event_types: event_types.into_iter().map(Into::into).collect(),
            signature_config: SignatureConfig::None,
            headers: HashMap::new(),
            timeout: DEFAULT_ENDPOINT_TIMEOUT,
        }
    }

    /// Sets the HTTP method.
    pub fn with_method(mut self, method: HttpMethod) -> Self {
        self.method = method;
        self
    }

    /// Sets the signature configuration.
    pub fn with_signature(mut self, config: SignatureConfig) -> Self {
        self.signature_config = config;
        self
    }

    /// Adds a custom header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Registered webhook endpoint.
///
/// Defines where and how to deliver events, plus cumulative delivery health
/// counters surfaced to the monitoring dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique identifier for this endpoint.
    pub id: EndpointId,

    /// Human-readable endpoint name.
    pub name: String,

    /// Target URL for webhook delivery.
    ///
    /// Must be HTTPS when the registry runs in production mode.
    pub url: String,

    /// HTTP method used for delivery.
    pub method: HttpMethod,

    /// Subscribed event types, deduplicated, in the order supplied.
    pub event_types: Vec<String>,

    /// Signature configuration for outbound payloads.
    pub signature_config: SignatureConfig,

    /// Custom headers attached to every delivery.
    pub headers: HashMap<String, String>,

    /// Per-attempt HTTP timeout. Hard upper bound on delivery latency.
    pub timeout: Duration,

    /// Whether this endpoint should receive deliveries.
    ///
    /// Inactive endpoints are skipped by the router and the retry
    /// scheduler. Used for soft-disable without losing configuration.
    pub is_active: bool,

    /// When this endpoint was registered.
    pub created_at: DateTime<Utc>,

    /// Timestamp of the most recent delivery attempt, success or failure.
    pub last_triggered_at: Option<DateTime<Utc>>,

    /// Cumulative successful deliveries.
    pub success_count: u64,

    /// Cumulative failed delivery attempts.
    pub failure_count: u64,
}

impl Endpoint {
    /// Whether this endpoint subscribes to the given event type.
    pub fn subscribes_to(&self, event_type: &str) -> bool {
        self.event_types.iter().any(|t| t == event_type)
    }
}

/// Domain event accepted for delivery.
///
/// Immutable once accepted. Retained as long as its ledger entries
/// reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event.
    pub id: EventId,

    /// Name of the system that emitted the event.
    pub source: String,

    /// Namespaced event type, e.g. `user.created`.
    pub event_type: String,

    /// Structured payload delivered to subscribers.
    pub payload: serde_json::Value,

    /// Header metadata from the originating system.
    pub headers: HashMap<String, String>,

    /// When the event was accepted.
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Creates a new event with a random ID, stamped at the current time.
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: EventId::new(),
            source: source.into(),
            event_type: event_type.into(),
            payload,
            headers: HashMap::new(),
            received_at: Utc::now(),
        }
    }

    /// Attaches header metadata from the originating system.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Payload serialized to JSON bytes.
    pub fn payload_bytes(&self) -> Vec<u8> {
        // Serializing a serde_json::Value cannot fail; keys are strings.
        serde_json::to_vec(&self.payload).unwrap_or_default()
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Attempt dispatched, HTTP call not yet resolved.
    Pending,
    /// Endpoint returned a 2xx status.
    Success,
    /// Non-2xx status, connection error, or timeout.
    Failed,
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Audit record of one delivery attempt.
///
/// References its event and endpoint by ID only; the ledger owns these
/// records independently of either lifecycle. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    /// Unique identifier for this attempt.
    pub id: AttemptId,

    /// Event being delivered.
    pub event_id: EventId,

    /// Endpoint this attempt was made to.
    pub endpoint_id: EndpointId,

    /// Event type, copied from the event for ledger filtering.
    pub event_type: String,

    /// Sequential attempt number for this (event, endpoint) pair.
    ///
    /// Starts at 1 and is strictly increasing with no gaps.
    pub attempt_number: u32,

    /// When this attempt was dispatched.
    pub attempted_at: DateTime<Utc>,

    /// Resolution of the HTTP call.
    pub outcome: AttemptOutcome,

    /// HTTP status code received, if the endpoint responded.
    pub response_status: Option<u16>,

    /// Round-trip latency in milliseconds, once resolved.
    pub latency_ms: Option<u64>,

    /// Human-readable error description for failed attempts.
    pub error_message: Option<String>,
}

impl DeliveryAttempt {
    /// Creates a pending attempt at the moment of dispatch.
    pub fn started(
        event: &Event,
        endpoint_id: EndpointId,
        attempt_number: u32,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AttemptId::new(),
            event_id: event.id,
            endpoint_id,
            event_type: event.event_type.clone(),
            attempt_number,
            attempted_at,
            outcome: AttemptOutcome::Pending,
            response_status: None,
            latency_ms: None,
            error_message: None,
        }
    }

    /// Resolves the attempt as successful.
    pub fn succeeded(mut self, status: u16, latency: Duration) -> Self {
        self.outcome = AttemptOutcome::Success;
        self.response_status = Some(status);
        self.latency_ms = Some(duration_to_ms(latency));
        self
    }

    /// Resolves the attempt as failed.
    ///
    /// `status` is `None` when the request never produced an HTTP response
    /// (connection error or timeout).
    pub fn failed(
        mut self,
        status: Option<u16>,
        latency: Duration,
        error: impl Into<String>,
    ) -> Self {
        self.outcome = AttemptOutcome::Failed;
        self.response_status = status;
        self.latency_ms = Some(duration_to_ms(latency));
        self.error_message = Some(error.into());
        self
    }

    /// Whether the attempt resolved successfully.
    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }

    /// Whether the HTTP call has resolved.
    pub fn is_resolved(&self) -> bool {
        self.outcome != AttemptOutcome::Pending
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Delivery lifecycle state for one (event, endpoint) pair.
///
/// ```text
/// Pending -> Delivering -> Succeeded
///                       -> AwaitingRetry -> Delivering -> ...
///                       -> PermanentlyFailed
/// ```
///
/// `Succeeded` and `PermanentlyFailed` are terminal for automatic
/// processing; a manual retry re-opens either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    /// Task created, no attempt dispatched yet.
    Pending,

    /// An attempt is in flight.
    Delivering,

    /// Terminal success state.
    Succeeded,

    /// Waiting for the backoff delay before the next attempt.
    AwaitingRetry {
        /// When the next attempt will be dispatched.
        next_attempt_at: DateTime<Utc>,
    },

    /// Retry budget exhausted. Requires explicit manual retry to resume.
    PermanentlyFailed,
}

impl DeliveryState {
    /// Whether automatic processing has finished for this pair.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::PermanentlyFailed)
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Delivering => write!(f, "delivering"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::AwaitingRetry { .. } => write!(f, "awaiting_retry"),
            Self::PermanentlyFailed => write!(f, "permanently_failed"),
        }
    }
}
