//! Event routing against the endpoint registry.
//!
//! Routing is a pure read over current registry state: it produces dispatch
//! tasks and causes no side effects. Later registry changes never affect
//! tasks already produced.

use std::sync::Arc;

use hookline_core::{EndpointId, EndpointStore, Event, EventId};

/// One unit of delivery work: an event bound for a single endpoint.
///
/// The event is shared by reference count so fan-out to many subscribers
/// does not copy the payload.
#[derive(Debug, Clone)]
pub struct DispatchTask {
    /// Event to deliver.
    pub event: Arc<Event>,
    /// Destination endpoint.
    pub endpoint_id: EndpointId,
}

impl DispatchTask {
    /// Identifier of the event being dispatched.
    pub fn event_id(&self) -> EventId {
        self.event.id
    }
}

/// Matches events to subscribed endpoints.
#[derive(Clone)]
pub struct EventRouter {
    endpoints: Arc<EndpointStore>,
}

impl EventRouter {
    /// Creates a router over the given registry.
    pub fn new(endpoints: Arc<EndpointStore>) -> Self {
        Self { endpoints }
    }

    /// Produces one dispatch task per active subscriber of the event's
    /// type, in endpoint-registration order.
    ///
    /// Zero matches yields an empty vec; an event nobody listens to is not
    /// an error.
    pub async fn route(&self, event: Event) -> Vec<DispatchTask> {
        let subscribers = self.endpoints.subscribers(&event.event_type).await;
        let event = Arc::new(event);

        subscribers
            .into_iter()
            .map(|endpoint| DispatchTask { event: Arc::clone(&event), endpoint_id: endpoint.id })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use hookline_core::{EndpointConfig, RegistryConfig, RealClock};

    use super::*;

    fn router_with_store() -> (EventRouter, Arc<EndpointStore>) {
        let endpoints =
            Arc::new(EndpointStore::new(RegistryConfig::permissive(), Arc::new(RealClock)));
        (EventRouter::new(Arc::clone(&endpoints)), endpoints)
    }

    #[tokio::test]
    async fn routes_in_registration_order() {
        let (router, endpoints) = router_with_store();

        let first = endpoints
            .register(EndpointConfig::new("a", "http://a.test/hook", ["user.created"]))
            .await
            .unwrap();
        let second = endpoints
            .register(EndpointConfig::new("b", "http://b.test/hook", ["user.created"]))
            .await
            .unwrap();

        let tasks = router.route(Event::new("auth", "user.created", serde_json::Value::Null)).await;
        let ids: Vec<EndpointId> = tasks.iter().map(|t| t.endpoint_id).collect();
        assert_eq!(ids, vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn routing_is_deterministic_for_unchanged_registry() {
        let (router, endpoints) = router_with_store();

        for name in ["a", "b", "c", "d"] {
            endpoints
                .register(EndpointConfig::new(
                    name,
                    format!("http://{name}.test/hook"),
                    ["user.created"],
                ))
                .await
                .unwrap();
        }

        let event = Event::new("auth", "user.created", serde_json::Value::Null);
        let first_pass: Vec<EndpointId> =
            router.route(event.clone()).await.iter().map(|t| t.endpoint_id).collect();
        let second_pass: Vec<EndpointId> =
            router.route(event).await.iter().map(|t| t.endpoint_id).collect();

        assert_eq!(first_pass.len(), 4);
        assert_eq!(first_pass, second_pass);
    }

    #[tokio::test]
    async fn inactive_and_unsubscribed_endpoints_skipped() {
        let (router, endpoints) = router_with_store();

        let inactive = endpoints
            .register(EndpointConfig::new("a", "http://a.test/hook", ["user.created"]))
            .await
            .unwrap();
        endpoints.set_active(inactive.id, false).await.unwrap();
        endpoints
            .register(EndpointConfig::new("b", "http://b.test/hook", ["order.completed"]))
            .await
            .unwrap();

        let tasks = router.route(Event::new("auth", "user.created", serde_json::Value::Null)).await;
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn fan_out_shares_one_event_allocation() {
        let (router, endpoints) = router_with_store();

        for name in ["a", "b", "c"] {
            endpoints
                .register(EndpointConfig::new(
                    name,
                    format!("http://{name}.test/hook"),
                    ["user.created"],
                ))
                .await
                .unwrap();
        }

        let tasks = router.route(Event::new("auth", "user.created", serde_json::Value::Null)).await;
        assert_eq!(tasks.len(), 3);
        assert!(Arc::ptr_eq(&tasks[0].event, &tasks[1].event));
        assert!(Arc::ptr_eq(&tasks[1].event, &tasks[2].event));
    }
}
