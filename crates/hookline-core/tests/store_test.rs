//! Integration tests for the in-memory store: registry, event store, and
//! delivery ledger working against one shared `Store`.

use std::sync::Arc;

use chrono::Utc;
use hookline_core::{
    AttemptOutcome, DeliveryAttempt, EndpointConfig, Event, LedgerQuery, RegistryConfig, Store,
    TestClock,
};

fn test_store() -> Store {
    Store::new(RegistryConfig::permissive(), Arc::new(TestClock::new()))
}

fn failed_attempt(event: &Event, endpoint_id: hookline_core::EndpointId, n: u32) -> DeliveryAttempt {
    DeliveryAttempt::started(event, endpoint_id, n, Utc::now()).failed(
        Some(500),
        std::time::Duration::from_millis(8),
        "HTTP 500",
    )
}

#[tokio::test]
async fn endpoint_removal_leaves_ledger_intact() {
    let store = test_store();
    let endpoint = store
        .endpoints
        .register(EndpointConfig::new("crm", "https://crm.example.com/hooks", ["user.created"]))
        .await
        .unwrap();
    let event = Event::new("auth", "user.created", serde_json::json!({"id": 1}));

    store.ledger.record(failed_attempt(&event, endpoint.id, 1)).await.unwrap();
    store.endpoints.remove(endpoint.id).await;

    assert!(store.endpoints.get(endpoint.id).await.is_none());
    let attempts = store.ledger.attempts_for_pair(event.id, endpoint.id).await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].endpoint_id, endpoint.id);
}

#[tokio::test]
async fn reregistered_endpoint_numbering_starts_fresh() {
    let store = test_store();
    let event = Event::new("auth", "user.created", serde_json::Value::Null);

    let first = store
        .endpoints
        .register(EndpointConfig::new("crm", "https://crm.example.com/hooks", ["user.created"]))
        .await
        .unwrap();
    store.ledger.record(failed_attempt(&event, first.id, 1)).await.unwrap();
    store.endpoints.remove(first.id).await;

    // A new registration is a new identity, so its pair numbering starts
    // at 1 while the old pair's history stays queryable.
    let second = store
        .endpoints
        .register(EndpointConfig::new("crm", "https://crm.example.com/hooks", ["user.created"]))
        .await
        .unwrap();
    assert_ne!(first.id, second.id);
    assert_eq!(store.ledger.next_attempt_number(event.id, second.id).await, 1);
    assert_eq!(store.ledger.next_attempt_number(event.id, first.id).await, 2);
}

#[tokio::test]
async fn ledger_query_filters_compose() {
    let store = test_store();
    let endpoint = store
        .endpoints
        .register(EndpointConfig::new(
            "crm",
            "https://crm.example.com/hooks",
            ["user.created", "order.completed"],
        ))
        .await
        .unwrap();

    let user_event = Event::new("auth", "user.created", serde_json::Value::Null);
    let order_event = Event::new("billing", "order.completed", serde_json::Value::Null);

    store.ledger.record(failed_attempt(&user_event, endpoint.id, 1)).await.unwrap();
    store
        .ledger
        .record(
            DeliveryAttempt::started(&order_event, endpoint.id, 1, Utc::now())
                .succeeded(200, std::time::Duration::from_millis(5)),
        )
        .await
        .unwrap();

    let page = store
        .ledger
        .query(
            &LedgerQuery::default()
                .for_endpoint(endpoint.id)
                .for_event_type("order.completed")
                .with_outcome(AttemptOutcome::Success),
        )
        .await;
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].event_id, order_event.id);

    let none = store
        .ledger
        .query(
            &LedgerQuery::default()
                .for_event_type("order.completed")
                .with_outcome(AttemptOutcome::Failed),
        )
        .await;
    assert!(none.entries.is_empty());
}

#[tokio::test]
async fn ledger_since_filter_uses_attempt_time() {
    let store = test_store();
    let endpoint = store
        .endpoints
        .register(EndpointConfig::new("crm", "https://crm.example.com/hooks", ["user.created"]))
        .await
        .unwrap();
    let event = Event::new("auth", "user.created", serde_json::Value::Null);

    let early = Utc::now() - chrono::Duration::hours(2);
    let cutoff = Utc::now() - chrono::Duration::hours(1);

    store
        .ledger
        .record(DeliveryAttempt::started(&event, endpoint.id, 1, early).failed(
            Some(500),
            std::time::Duration::from_millis(3),
            "HTTP 500",
        ))
        .await
        .unwrap();
    store.ledger.record(failed_attempt(&event, endpoint.id, 2)).await.unwrap();

    let page = store.ledger.query(&LedgerQuery::default().since(cutoff)).await;
    assert_eq!(page.entries.len(), 1);
    assert_eq!(page.entries[0].attempt_number, 2);
}

#[tokio::test]
async fn events_survive_unrelated_registry_churn() {
    let store = test_store();
    let event = Event::new("auth", "user.created", serde_json::json!({"id": 9}));
    let event_id = event.id;
    store.events.insert(event).await.unwrap();

    let endpoint = store
        .endpoints
        .register(EndpointConfig::new("crm", "https://crm.example.com/hooks", ["user.created"]))
        .await
        .unwrap();
    store.endpoints.remove(endpoint.id).await;

    let stored = store.events.get(event_id).await.unwrap();
    assert_eq!(stored.payload, serde_json::json!({"id": 9}));
}
