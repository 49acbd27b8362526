//! Exponential backoff retry policy with jitter.
//!
//! Failed deliveries are retried on a `base × 2^(attempt-1)` schedule with
//! ±jitter randomization to spread simultaneous failures apart. The jittered
//! delay never drops below the base delay and never exceeds the configured
//! maximum.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Retry policy for failed webhook deliveries.
///
/// Applies uniformly to every endpoint; any HTTP failure is retried until
/// the attempt budget runs out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of delivery attempts (including the initial attempt).
    pub max_attempts: u32,

    /// Base delay for exponential backoff calculation.
    pub base_delay: Duration,

    /// Maximum delay between retry attempts.
    pub max_delay: Duration,

    /// Jitter percentage (0.0 to 1.0) to add randomness.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.2, // ±20% randomization
        }
    }
}

/// Result of a retry decision after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the given backoff delay.
    Retry {
        /// How long to wait before the next attempt.
        delay: Duration,
    },
    /// Attempt budget exhausted; the delivery is permanently failed.
    GiveUp,
}

impl RetryPolicy {
    /// Decides what to do after attempt `attempt_number` failed.
    pub fn decide(&self, attempt_number: u32) -> RetryDecision {
        if attempt_number >= self.max_attempts {
            return RetryDecision::GiveUp;
        }

        RetryDecision::Retry { delay: self.backoff_delay(attempt_number) }
    }

    /// Backoff delay after the nth failed attempt (1-based).
    ///
    /// Doubles per attempt, jittered, then clamped into
    /// `[base_delay, max_delay]`.
    pub fn backoff_delay(&self, attempt_number: u32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).min(20);
        let multiplier = 2_u32.saturating_pow(exponent);
        let exponential = self.base_delay.saturating_mul(multiplier);

        let jittered = apply_jitter(exponential.min(self.max_delay), self.jitter_factor);

        jittered.clamp(self.base_delay.min(self.max_delay), self.max_delay)
    }
}

/// Applies jitter to a duration to prevent thundering herd effects.
///
/// Randomizes the delay by ±jitter_factor percentage. For example, with
/// jitter_factor=0.2, a 10s delay becomes 8s to 12s randomly.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped_jitter = jitter_factor.clamp(0.0, 1.0);

    let mut rng = rand::rng();
    let jitter_range = duration.as_secs_f64() * clamped_jitter;
    let jitter_offset = rng.random_range(-jitter_range..=jitter_range);
    let jittered_secs = duration.as_secs_f64() + jitter_offset;

    Duration::from_secs_f64(jittered_secs.max(0.0))
}
