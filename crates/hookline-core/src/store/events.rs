//! Store for accepted events.
//!
//! Events are immutable once accepted. Even an event matching zero
//! subscribers is recorded here, so the caller has a durable "received"
//! record regardless of routing outcome.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::{CoreError, Result},
    models::{Event, EventId},
};

/// Accepted-event collection keyed by event ID.
#[derive(Default)]
pub struct EventStore {
    inner: RwLock<HashMap<EventId, Event>>,
}

impl EventStore {
    /// Creates an empty event store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an accepted event.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when an event with the same ID was
    /// already accepted; events are immutable and never replaced.
    pub async fn insert(&self, event: Event) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.contains_key(&event.id) {
            return Err(CoreError::validation(format!("event {} already submitted", event.id)));
        }
        inner.insert(event.id, event);
        Ok(())
    }

    /// Returns a copy of the event, if accepted.
    pub async fn get(&self, id: EventId) -> Option<Event> {
        self.inner.read().await.get(&id).cloned()
    }

    /// Whether an event with this ID was accepted.
    pub async fn contains(&self, id: EventId) -> bool {
        self.inner.read().await.contains_key(&id)
    }

    /// Number of accepted events.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether no events have been accepted.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_event_id_rejected() {
        let store = EventStore::new();
        let event = Event::new("billing", "order.completed", serde_json::json!({"amount": 1}));

        store.insert(event.clone()).await.unwrap();
        let err = store.insert(event.clone()).await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn stored_event_retrievable_by_id() {
        let store = EventStore::new();
        let event = Event::new("auth", "user.created", serde_json::Value::Null);
        let id = event.id;

        store.insert(event).await.unwrap();
        let found = store.get(id).await.unwrap();
        assert_eq!(found.event_type, "user.created");
        assert!(store.contains(id).await);
    }
}
