//! Endpoint registry with an event-type subscription index.
//!
//! The registry is read-heavy: the router consults the subscription index
//! on every routing call while registration and removal are rare. Reads
//! proceed concurrently under a `tokio::sync::RwLock`; writers are
//! exclusive with respect to each other and to readers.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::{
    error::{CoreError, Result},
    models::{Endpoint, EndpointConfig, EndpointId},
    time::Clock,
};

/// Registry validation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Require HTTPS endpoint URLs.
    ///
    /// Enabled in production. Disabled in tests so deliveries can target
    /// local plain-HTTP mock servers.
    pub require_https: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { require_https: true }
    }
}

impl RegistryConfig {
    /// Policy accepting plain-HTTP URLs, for tests and local development.
    pub fn permissive() -> Self {
        Self { require_https: false }
    }
}

#[derive(Default)]
struct Inner {
    endpoints: HashMap<EndpointId, Endpoint>,
    /// Endpoint IDs in registration order.
    order: Vec<EndpointId>,
    /// Event type -> subscribed endpoint IDs, in registration order.
    index: HashMap<String, Vec<EndpointId>>,
    /// Registration sequence number per endpoint, for index ordering.
    seq: HashMap<EndpointId, u64>,
    next_seq: u64,
}

/// Endpoint registry.
///
/// Maintains the event-type index so subscriber lookup is proportional to
/// the number of subscribers for a type, not the total endpoint count.
pub struct EndpointStore {
    config: RegistryConfig,
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

impl EndpointStore {
    /// Creates an empty registry.
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock, inner: RwLock::new(Inner::default()) }
    }

    /// Registers a new endpoint from a validated definition.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when the URL is not an absolute
    /// HTTPS URL (in HTTPS-required mode), the event-type set is empty,
    /// or the timeout is zero.
    pub async fn register(&self, definition: EndpointConfig) -> Result<Endpoint> {
        let event_types = self.validate(&definition)?;

        let endpoint = Endpoint {
            id: EndpointId::new(),
            name: definition.name,
            url: definition.url,
            method: definition.method,
            event_types,
            signature_config: definition.signature_config,
            headers: definition.headers,
            timeout: definition.timeout,
            is_active: true,
            created_at: self.clock.now_utc(),
            last_triggered_at: None,
            success_count: 0,
            failure_count: 0,
        };

        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.seq.insert(endpoint.id, seq);
        inner.order.push(endpoint.id);
        for event_type in &endpoint.event_types {
            inner.index.entry(event_type.clone()).or_default().push(endpoint.id);
        }
        inner.endpoints.insert(endpoint.id, endpoint.clone());

        debug!(endpoint_id = %endpoint.id, url = %endpoint.url, "endpoint registered");
        Ok(endpoint)
    }

    /// Replaces an endpoint's configuration, keeping its identity,
    /// activity flag, and delivery counters.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown ID, or
    /// `CoreError::Validation` when the new definition is malformed.
    pub async fn update(&self, id: EndpointId, definition: EndpointConfig) -> Result<Endpoint> {
        let event_types = self.validate(&definition)?;

        let mut inner = self.inner.write().await;
        let (old_types, updated) = {
            let endpoint = inner
                .endpoints
                .get_mut(&id)
                .ok_or_else(|| CoreError::not_found(format!("endpoint {id}")))?;
            let old_types = std::mem::replace(&mut endpoint.event_types, event_types.clone());
            endpoint.name = definition.name;
            endpoint.url = definition.url;
            endpoint.method = definition.method;
            endpoint.signature_config = definition.signature_config;
            endpoint.headers = definition.headers;
            endpoint.timeout = definition.timeout;
            (old_types, endpoint.clone())
        };

        for event_type in &old_types {
            if !event_types.contains(event_type) {
                Self::unindex(&mut inner, event_type, id);
            }
        }
        for event_type in &event_types {
            if !old_types.contains(event_type) {
                Self::index_in_registration_order(&mut inner, event_type, id);
            }
        }

        Ok(updated)
    }

    /// Toggles whether an endpoint receives deliveries.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::NotFound` for an unknown ID.
    pub async fn set_active(&self, id: EndpointId, active: bool) -> Result<()> {
        let mut inner = self.inner.write().await;
        let endpoint = inner
            .endpoints
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found(format!("endpoint {id}")))?;
        endpoint.is_active = active;
        debug!(endpoint_id = %id, active, "endpoint activity toggled");
        Ok(())
    }

    /// Removes an endpoint.
    ///
    /// Idempotent: removing an unknown ID is a no-op, tolerating
    /// concurrent deletes. Ledger entries referencing the endpoint are
    /// untouched.
    pub async fn remove(&self, id: EndpointId) {
        let mut inner = self.inner.write().await;
        if let Some(endpoint) = inner.endpoints.remove(&id) {
            inner.order.retain(|eid| *eid != id);
            inner.seq.remove(&id);
            for event_type in &endpoint.event_types {
                Self::unindex(&mut inner, event_type, id);
            }
            debug!(endpoint_id = %id, "endpoint removed");
        }
    }

    /// Returns a snapshot of the endpoint, if registered.
    pub async fn get(&self, id: EndpointId) -> Option<Endpoint> {
        self.inner.read().await.endpoints.get(&id).cloned()
    }

    /// All endpoints in registration order, for the monitoring surface.
    pub async fn list(&self) -> Vec<Endpoint> {
        let inner = self.inner.read().await;
        inner.order.iter().filter_map(|id| inner.endpoints.get(id).cloned()).collect()
    }

    /// Active endpoints subscribed to the given event type, in
    /// registration order.
    ///
    /// Served from the maintained index: cost is proportional to the
    /// subscriber count for this type.
    pub async fn subscribers(&self, event_type: &str) -> Vec<Endpoint> {
        let inner = self.inner.read().await;
        inner
            .index
            .get(event_type)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.endpoints.get(id))
                    .filter(|endpoint| endpoint.is_active)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Records a delivery outcome against the endpoint's health counters.
    ///
    /// A no-op when the endpoint has been removed: an attempt already in
    /// flight at removal time still completes, and its ledger entry is the
    /// durable record.
    pub async fn record_outcome(&self, id: EndpointId, success: bool, at: DateTime<Utc>) {
        let mut inner = self.inner.write().await;
        if let Some(endpoint) = inner.endpoints.get_mut(&id) {
            if success {
                endpoint.success_count += 1;
            } else {
                endpoint.failure_count += 1;
            }
            endpoint.last_triggered_at = Some(at);
        }
    }

    /// Whether the endpoint exists and is active.
    ///
    /// Checked by the scheduler before every dispatch so deactivation or
    /// removal prevents future attempts without cancelling in-flight ones.
    pub async fn is_deliverable(&self, id: EndpointId) -> bool {
        self.inner.read().await.endpoints.get(&id).is_some_and(|e| e.is_active)
    }

    /// Number of registered endpoints.
    pub async fn len(&self) -> usize {
        self.inner.read().await.endpoints.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.endpoints.is_empty()
    }

    fn validate(&self, definition: &EndpointConfig) -> Result<Vec<String>> {
        let url = Url::parse(&definition.url)
            .map_err(|e| CoreError::validation(format!("invalid endpoint URL: {e}")))?;
        if !url.has_host() {
            return Err(CoreError::validation("endpoint URL must be absolute"));
        }
        match url.scheme() {
            "https" => {},
            "http" if !self.config.require_https => {},
            scheme => {
                return Err(CoreError::validation(format!(
                    "endpoint URL must use https, got scheme '{scheme}'"
                )));
            },
        }

        if definition.timeout.is_zero() {
            return Err(CoreError::validation("endpoint timeout must be greater than zero"));
        }

        let mut event_types = Vec::new();
        for event_type in &definition.event_types {
            if event_type.trim().is_empty() {
                return Err(CoreError::validation("event type must not be empty"));
            }
            if !event_types.contains(event_type) {
                event_types.push(event_type.clone());
            }
        }
        if event_types.is_empty() {
            return Err(CoreError::validation("subscribed event-type set must not be empty"));
        }

        Ok(event_types)
    }

    fn unindex(inner: &mut Inner, event_type: &str, id: EndpointId) {
        if let Some(ids) = inner.index.get_mut(event_type) {
            ids.retain(|eid| *eid != id);
            if ids.is_empty() {
                inner.index.remove(event_type);
            }
        }
    }

    /// Inserts into a type's subscriber list at the position matching the
    /// endpoint's registration order, so routing order stays stable when
    /// an edit adds a subscription after the fact.
    fn index_in_registration_order(inner: &mut Inner, event_type: &str, id: EndpointId) {
        let Inner { index, seq, .. } = inner;
        let target = seq.get(&id).copied().unwrap_or(u64::MAX);
        let ids = index.entry(event_type.to_string()).or_default();
        let position = ids
            .iter()
            .position(|eid| seq.get(eid).copied().unwrap_or(u64::MAX) > target)
            .unwrap_or(ids.len());
        ids.insert(position, id);
    }
}
