//! Core domain models and state for the webhook delivery engine.
//!
//! Provides strongly-typed domain primitives, the in-memory store, and the
//! clock abstraction. All other crates depend on these foundational types
//! for type safety and consistency.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod store;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    AttemptId, AttemptOutcome, DeliveryAttempt, DeliveryState, Endpoint, EndpointConfig,
    EndpointId, Event, EventId, HttpMethod, SignatureConfig,
};
pub use store::{
    DeliveryLedger, EndpointStore, EventStore, LedgerPage, LedgerQuery, RegistryConfig, Store,
};
pub use time::{Clock, RealClock, TestClock};
