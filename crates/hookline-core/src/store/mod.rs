//! In-memory store owning all endpoint, event, and delivery-attempt state.
//!
//! The store is the single explicit owner of mutable state in the system.
//! Components (router, engine, scheduler) receive an `Arc<Store>` handle
//! rather than reaching for ambient globals, so construction and teardown
//! are explicit and tests can build isolated stores freely.

use std::sync::Arc;

pub mod attempts;
pub mod endpoints;
pub mod events;

pub use attempts::{DeliveryLedger, LedgerPage, LedgerQuery};
pub use endpoints::{EndpointStore, RegistryConfig};
pub use events::EventStore;

use crate::time::Clock;

/// Container providing unified access to each domain collection.
#[derive(Clone)]
pub struct Store {
    /// Endpoint registry with event-type subscription index.
    pub endpoints: Arc<EndpointStore>,

    /// Accepted events, immutable once stored.
    pub events: Arc<EventStore>,

    /// Append-only delivery attempt ledger.
    pub ledger: Arc<DeliveryLedger>,
}

impl Store {
    /// Creates a new empty store.
    pub fn new(config: RegistryConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            endpoints: Arc::new(EndpointStore::new(config, clock)),
            events: Arc::new(EventStore::new()),
            ledger: Arc::new(DeliveryLedger::new()),
        }
    }
}
