//! Append-only delivery attempt ledger.
//!
//! Every delivery attempt, success or failure, is retained for audit and
//! replay. Entries are immutable once recorded and never deleted; the only
//! permitted write is an append. Attempt numbering per (event, endpoint)
//! pair is enforced here: strictly increasing, gapless, starting at 1.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{CoreError, Result},
    models::{AttemptOutcome, DeliveryAttempt, EndpointId, EventId},
};

/// Default page size for ledger queries.
pub const DEFAULT_QUERY_LIMIT: usize = 50;

/// Filter set for ledger queries.
///
/// All filters are conjunctive. Results are newest-first; `cursor` resumes
/// a previous page so the monitoring surface can walk history without
/// loading it whole.
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    /// Restrict to attempts against one endpoint.
    pub endpoint_id: Option<EndpointId>,
    /// Restrict to attempts for events of one type.
    pub event_type: Option<String>,
    /// Restrict to one outcome.
    pub outcome: Option<AttemptOutcome>,
    /// Restrict to attempts dispatched at or after this time.
    pub since: Option<DateTime<Utc>>,
    /// Maximum entries per page; zero with `Default` means
    /// [`DEFAULT_QUERY_LIMIT`].
    pub limit: usize,
    /// Opaque continuation cursor from a previous [`LedgerPage`].
    pub cursor: Option<u64>,
}

impl LedgerQuery {
    /// Restricts results to one endpoint.
    pub fn for_endpoint(mut self, endpoint_id: EndpointId) -> Self {
        self.endpoint_id = Some(endpoint_id);
        self
    }

    /// Restricts results to one event type.
    pub fn for_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restricts results to one outcome.
    pub fn with_outcome(mut self, outcome: AttemptOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Restricts results to attempts at or after the given time.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Resumes from a previous page's cursor.
    pub fn after(mut self, cursor: u64) -> Self {
        self.cursor = Some(cursor);
        self
    }

    fn effective_limit(&self) -> usize {
        if self.limit == 0 {
            DEFAULT_QUERY_LIMIT
        } else {
            self.limit
        }
    }

    fn matches(&self, attempt: &DeliveryAttempt) -> bool {
        if self.endpoint_id.is_some_and(|id| attempt.endpoint_id != id) {
            return false;
        }
        if self.event_type.as_deref().is_some_and(|t| attempt.event_type != t) {
            return false;
        }
        if self.outcome.is_some_and(|o| attempt.outcome != o) {
            return false;
        }
        if self.since.is_some_and(|since| attempt.attempted_at < since) {
            return false;
        }
        true
    }
}

/// One page of ledger query results, newest-first.
#[derive(Debug, Clone)]
pub struct LedgerPage {
    /// Matching attempts for this page.
    pub entries: Vec<DeliveryAttempt>,
    /// Cursor for the next page; `None` when the scan is exhausted.
    pub next_cursor: Option<u64>,
}

#[derive(Default)]
struct Inner {
    log: Vec<DeliveryAttempt>,
    last_attempt: HashMap<(EventId, EndpointId), u32>,
}

/// Append-only ledger of delivery attempts.
#[derive(Default)]
pub struct DeliveryLedger {
    inner: RwLock<Inner>,
}

impl DeliveryLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resolved attempt.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` when the attempt is still pending,
    /// or when its number breaks the strictly-increasing gapless sequence
    /// for its (event, endpoint) pair.
    pub async fn record(&self, attempt: DeliveryAttempt) -> Result<()> {
        if !attempt.is_resolved() {
            return Err(CoreError::validation("ledger only records resolved attempts"));
        }

        let mut inner = self.inner.write().await;
        let pair = (attempt.event_id, attempt.endpoint_id);
        let expected = inner.last_attempt.get(&pair).copied().unwrap_or(0) + 1;
        if attempt.attempt_number != expected {
            return Err(CoreError::validation(format!(
                "attempt number {} out of sequence for event {} endpoint {} (expected {})",
                attempt.attempt_number, attempt.event_id, attempt.endpoint_id, expected
            )));
        }

        inner.last_attempt.insert(pair, attempt.attempt_number);
        inner.log.push(attempt);
        Ok(())
    }

    /// Next attempt number for the pair: one past the last recorded
    /// attempt, starting at 1.
    pub async fn next_attempt_number(&self, event_id: EventId, endpoint_id: EndpointId) -> u32 {
        let inner = self.inner.read().await;
        inner.last_attempt.get(&(event_id, endpoint_id)).copied().unwrap_or(0) + 1
    }

    /// All attempts for an event, oldest first.
    pub async fn attempts_for_event(&self, event_id: EventId) -> Vec<DeliveryAttempt> {
        let inner = self.inner.read().await;
        inner.log.iter().filter(|a| a.event_id == event_id).cloned().collect()
    }

    /// All attempts for one (event, endpoint) pair, oldest first.
    pub async fn attempts_for_pair(
        &self,
        event_id: EventId,
        endpoint_id: EndpointId,
    ) -> Vec<DeliveryAttempt> {
        let inner = self.inner.read().await;
        inner
            .log
            .iter()
            .filter(|a| a.event_id == event_id && a.endpoint_id == endpoint_id)
            .cloned()
            .collect()
    }

    /// Filtered query over the ledger, newest-first, one bounded page at a
    /// time.
    pub async fn query(&self, query: &LedgerQuery) -> LedgerPage {
        let inner = self.inner.read().await;
        let limit = query.effective_limit();

        // Cursor is the log position of the last entry returned; scanning
        // resumes strictly below it.
        let start = query
            .cursor
            .map(|c| usize::try_from(c).unwrap_or(usize::MAX))
            .unwrap_or(inner.log.len())
            .min(inner.log.len());

        let mut entries = Vec::new();
        let mut next_cursor = None;
        let mut last_returned = 0usize;

        for idx in (0..start).rev() {
            let attempt = &inner.log[idx];
            if !query.matches(attempt) {
                continue;
            }
            if entries.len() == limit {
                next_cursor = Some(last_returned as u64);
                break;
            }
            entries.push(attempt.clone());
            last_returned = idx;
        }

        LedgerPage { entries, next_cursor }
    }

    /// Total number of recorded attempts.
    pub async fn len(&self) -> usize {
        self.inner.read().await.log.len()
    }

    /// Whether the ledger holds no attempts.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.log.is_empty()
    }
}
