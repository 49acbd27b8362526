//! Webhook delivery engine: routing, signing, HTTP delivery, and retries.
//!
//! Events submitted through [`DeliveryService`] are routed to subscribed
//! endpoints and delivered over HTTP with optional HMAC-SHA256 signing.
//! Failed deliveries retry on a jittered exponential backoff schedule
//! until the attempt budget runs out; every attempt lands in the
//! append-only ledger owned by `hookline-core`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engine;
pub mod error;
pub mod retry;
pub mod router;
pub mod scheduler;
pub mod service;
pub mod signing;

pub use client::{ClientConfig, DeliveryClient, DeliveryRequest, DeliveryResponse};
pub use engine::DeliveryEngine;
pub use error::{DeliveryError, Result};
pub use retry::{RetryDecision, RetryPolicy};
pub use router::{DispatchTask, EventRouter};
pub use scheduler::{DeliveryHandle, RetryScheduler};
pub use service::{DeliveryService, ServiceConfig};
pub use signing::{sign_payload, verify_signature, PayloadSignature};
