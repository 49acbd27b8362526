//! Retry scheduler: drives each (event, endpoint) pair to resolution.
//!
//! One async task per pair runs attempts strictly in sequence; attempt k+1
//! never starts before attempt k resolves, so a pair has at most one open
//! attempt at any moment. Between failed attempts the task waits out the
//! backoff delay through the `Clock` abstraction, which lets tests advance
//! virtual time instead of sleeping.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use hookline_core::{
    Clock, CoreError, DeliveryState, Endpoint, EndpointId, Event, EventId, Store,
};
use tokio::{sync::RwLock, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    engine::DeliveryEngine,
    retry::{RetryDecision, RetryPolicy},
    router::DispatchTask,
};

type Pair = (EventId, EndpointId);

/// Handle to a running delivery task.
///
/// Dropping the handle does not cancel the task; delivery always runs to
/// resolution or shutdown.
#[derive(Debug)]
pub struct DeliveryHandle {
    /// Event being delivered.
    pub event_id: EventId,
    /// Destination endpoint.
    pub endpoint_id: EndpointId,
    join: JoinHandle<DeliveryState>,
}

impl DeliveryHandle {
    /// Waits until the task stops and returns the final delivery state.
    pub async fn settled(self) -> DeliveryState {
        // A join error means the task panicked; surface the pair as failed
        // rather than propagating the panic.
        self.join.await.unwrap_or(DeliveryState::PermanentlyFailed)
    }
}

/// Schedules delivery attempts and retries for dispatched tasks.
#[derive(Clone)]
pub struct RetryScheduler {
    engine: DeliveryEngine,
    store: Store,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
    states: Arc<RwLock<HashMap<Pair, DeliveryState>>>,
    live: Arc<RwLock<HashSet<Pair>>>,
    cancel: CancellationToken,
}

impl RetryScheduler {
    /// Creates a scheduler over the given engine and retry policy.
    pub fn new(
        engine: DeliveryEngine,
        store: Store,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine,
            store,
            policy,
            clock,
            states: Arc::new(RwLock::new(HashMap::new())),
            live: Arc::new(RwLock::new(HashSet::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts the automatic delivery task for a dispatch.
    pub async fn dispatch(&self, task: DispatchTask) -> DeliveryHandle {
        let pair = (task.event_id(), task.endpoint_id);
        self.set_state(pair, DeliveryState::Pending).await;
        self.live.write().await.insert(pair);

        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            let state = scheduler.run_pair(task.event, pair).await;
            scheduler.live.write().await.remove(&pair);
            state
        });

        DeliveryHandle { event_id: pair.0, endpoint_id: pair.1, join }
    }

    /// Manually re-opens a settled pair for exactly one more attempt.
    ///
    /// Numbering continues from the last recorded attempt. The new attempt
    /// either succeeds or puts the pair straight back into
    /// `PermanentlyFailed`; it re-enters no automatic backoff loop.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` while the pair's automatic task is
    /// still live, which would otherwise break the one-open-attempt rule.
    pub async fn retry(
        &self,
        event: Arc<Event>,
        endpoint: Endpoint,
    ) -> Result<DeliveryHandle, CoreError> {
        let pair = (event.id, endpoint.id);

        {
            let mut live = self.live.write().await;
            if live.contains(&pair) {
                return Err(CoreError::validation(format!(
                    "delivery for event {} to endpoint {} is still in progress",
                    pair.0, pair.1
                )));
            }
            live.insert(pair);
        }

        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            scheduler.set_state(pair, DeliveryState::Delivering).await;
            let attempt = scheduler.engine.deliver(&endpoint, &event).await;
            let state = if attempt.is_success() {
                DeliveryState::Succeeded
            } else {
                DeliveryState::PermanentlyFailed
            };
            scheduler.set_state(pair, state).await;
            scheduler.live.write().await.remove(&pair);
            state
        });

        Ok(DeliveryHandle { event_id: pair.0, endpoint_id: pair.1, join })
    }

    /// Attempt loop for one pair. Runs until the pair settles, the endpoint
    /// stops being deliverable, or shutdown.
    async fn run_pair(&self, event: Arc<Event>, pair: Pair) -> DeliveryState {
        loop {
            if self.cancel.is_cancelled() {
                return self.current_state(pair).await;
            }

            // Re-snapshot before every attempt: deactivation or removal
            // stops future attempts but never an attempt already running.
            let Some(endpoint) = self.deliverable_snapshot(pair.1).await else {
                tracing::info!(
                    event_id = %pair.0,
                    endpoint_id = %pair.1,
                    "endpoint no longer deliverable, stopping retries"
                );
                return self.current_state(pair).await;
            };

            self.set_state(pair, DeliveryState::Delivering).await;
            let attempt = self.engine.deliver(&endpoint, &event).await;

            if attempt.is_success() {
                self.set_state(pair, DeliveryState::Succeeded).await;
                return DeliveryState::Succeeded;
            }

            match self.policy.decide(attempt.attempt_number) {
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        event_id = %pair.0,
                        endpoint_id = %pair.1,
                        attempts = attempt.attempt_number,
                        "delivery permanently failed"
                    );
                    self.set_state(pair, DeliveryState::PermanentlyFailed).await;
                    return DeliveryState::PermanentlyFailed;
                },
                RetryDecision::Retry { delay } => {
                    let next_attempt_at = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| self.clock.now_utc().checked_add_signed(d))
                        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
                    let state = DeliveryState::AwaitingRetry { next_attempt_at };
                    self.set_state(pair, state).await;

                    tokio::select! {
                        () = self.clock.sleep(delay) => {},
                        () = self.cancel.cancelled() => return state,
                    }
                },
            }
        }
    }

    /// Stops scheduling new attempts. In-flight HTTP attempts complete and
    /// are recorded; pairs waiting out a backoff stay in `AwaitingRetry`.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Current delivery state for a pair, if it was ever dispatched.
    pub async fn delivery_state(
        &self,
        event_id: EventId,
        endpoint_id: EndpointId,
    ) -> Option<DeliveryState> {
        self.states.read().await.get(&(event_id, endpoint_id)).copied()
    }

    /// Pairs whose retry budget is exhausted and need operator attention.
    pub async fn permanently_failed(&self) -> Vec<(EventId, EndpointId)> {
        self.states
            .read()
            .await
            .iter()
            .filter(|(_, state)| **state == DeliveryState::PermanentlyFailed)
            .map(|(pair, _)| *pair)
            .collect()
    }

    async fn deliverable_snapshot(&self, endpoint_id: EndpointId) -> Option<Endpoint> {
        self.store.endpoints.get(endpoint_id).await.filter(|e| e.is_active)
    }

    async fn set_state(&self, pair: Pair, state: DeliveryState) {
        self.states.write().await.insert(pair, state);
    }

    async fn current_state(&self, pair: Pair) -> DeliveryState {
        self.states.read().await.get(&pair).copied().unwrap_or(DeliveryState::Pending)
    }
}
