//! Service facade tying registry, router, engine, and scheduler together.
//!
//! `DeliveryService` is the single entry point embedders use: endpoint
//! CRUD, event submission, manual retry, and the monitoring read surface.

use std::sync::Arc;

use hookline_core::{
    Clock, CoreError, DeliveryState, Endpoint, EndpointConfig, EndpointId, Event, EventId,
    LedgerPage, LedgerQuery, RealClock, RegistryConfig, Store,
};
use serde::{Deserialize, Serialize};

use crate::{
    client::{ClientConfig, DeliveryClient},
    engine::DeliveryEngine,
    error::DeliveryError,
    retry::RetryPolicy,
    router::EventRouter,
    scheduler::{DeliveryHandle, RetryScheduler},
};

/// Top-level configuration for a delivery service instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Endpoint registry settings.
    pub registry: RegistryConfig,
    /// Retry policy applied to every endpoint.
    pub retry: RetryPolicy,
    /// Outbound HTTP client settings.
    pub client: ClientConfig,
}

/// Webhook delivery service.
///
/// Owns the store and the scheduler; cheap to clone and share across
/// tasks.
#[derive(Clone)]
pub struct DeliveryService {
    store: Store,
    router: EventRouter,
    scheduler: RetryScheduler,
}

impl DeliveryService {
    /// Builds a service from configuration and a clock.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client
    /// cannot be built.
    pub fn new(config: ServiceConfig, clock: Arc<dyn Clock>) -> Result<Self, DeliveryError> {
        let store = Store::new(config.registry, Arc::clone(&clock));
        let client = DeliveryClient::new(&config.client)?;
        let engine = DeliveryEngine::new(store.clone(), client, Arc::clone(&clock));
        let scheduler = RetryScheduler::new(engine, store.clone(), config.retry, clock);
        let router = EventRouter::new(Arc::clone(&store.endpoints));

        Ok(Self { store, router, scheduler })
    }

    /// Builds a service with default configuration and the system clock.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client
    /// cannot be built.
    pub fn with_defaults() -> Result<Self, DeliveryError> {
        Self::new(ServiceConfig::default(), Arc::new(RealClock))
    }

    /// Accepts an event and dispatches one delivery task per subscriber.
    ///
    /// The event is recorded even when nobody subscribes to its type; the
    /// returned handle list is empty in that case.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when an event with the same id was
    /// already submitted.
    pub async fn submit(&self, event: Event) -> hookline_core::Result<Vec<DeliveryHandle>> {
        self.store.events.insert(event.clone()).await?;

        let tasks = self.router.route(event).await;
        let mut handles = Vec::with_capacity(tasks.len());
        for task in tasks {
            handles.push(self.scheduler.dispatch(task).await);
        }

        Ok(handles)
    }

    /// Manually retries delivery of an event to one endpoint.
    ///
    /// # Errors
    ///
    /// `CoreError::NotFound` for unknown event or endpoint ids,
    /// `CoreError::Validation` when the endpoint is deactivated or the
    /// pair's automatic delivery task is still running.
    pub async fn retry(
        &self,
        event_id: EventId,
        endpoint_id: EndpointId,
    ) -> hookline_core::Result<DeliveryHandle> {
        let event = self
            .store
            .events
            .get(event_id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("event {event_id}")))?;
        let endpoint = self
            .store
            .endpoints
            .get(endpoint_id)
            .await
            .ok_or_else(|| CoreError::not_found(format!("endpoint {endpoint_id}")))?;
        if !endpoint.is_active {
            return Err(CoreError::validation(format!("endpoint {endpoint_id} is deactivated")));
        }

        self.scheduler.retry(Arc::new(event), endpoint).await
    }

    /// Registers a new endpoint.
    ///
    /// # Errors
    ///
    /// `CoreError::Validation` on an invalid definition.
    pub async fn register_endpoint(
        &self,
        definition: EndpointConfig,
    ) -> hookline_core::Result<Endpoint> {
        self.store.endpoints.register(definition).await
    }

    /// Replaces an endpoint's definition.
    ///
    /// # Errors
    ///
    /// `CoreError::NotFound` for an unknown id, `CoreError::Validation` on
    /// an invalid definition.
    pub async fn update_endpoint(
        &self,
        id: EndpointId,
        definition: EndpointConfig,
    ) -> hookline_core::Result<Endpoint> {
        self.store.endpoints.update(id, definition).await
    }

    /// Activates or deactivates an endpoint.
    ///
    /// # Errors
    ///
    /// `CoreError::NotFound` for an unknown id.
    pub async fn set_endpoint_active(
        &self,
        id: EndpointId,
        active: bool,
    ) -> hookline_core::Result<()> {
        self.store.endpoints.set_active(id, active).await
    }

    /// Removes an endpoint. Idempotent; ledger history is untouched.
    pub async fn remove_endpoint(&self, id: EndpointId) {
        self.store.endpoints.remove(id).await;
    }

    /// Looks up one endpoint.
    pub async fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        self.store.endpoints.get(id).await
    }

    /// All registered endpoints in registration order.
    pub async fn endpoints(&self) -> Vec<Endpoint> {
        self.store.endpoints.list().await
    }

    /// Current delivery state for a pair, if it was ever dispatched.
    pub async fn delivery_state(
        &self,
        event_id: EventId,
        endpoint_id: EndpointId,
    ) -> Option<DeliveryState> {
        self.scheduler.delivery_state(event_id, endpoint_id).await
    }

    /// Pairs needing operator attention after exhausting their retries.
    pub async fn permanently_failed(&self) -> Vec<(EventId, EndpointId)> {
        self.scheduler.permanently_failed().await
    }

    /// Pages through the delivery ledger, newest-first.
    pub async fn query_ledger(&self, query: &LedgerQuery) -> LedgerPage {
        self.store.ledger.query(query).await
    }

    /// Direct access to the underlying store.
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Stops scheduling new delivery attempts. In-flight attempts complete
    /// and are recorded.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}
