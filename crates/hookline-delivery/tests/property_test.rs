//! Property-based tests for retry timing and payload signing.

use std::time::Duration;

use chrono::Utc;
use hookline_delivery::{signing, RetryDecision, RetryPolicy};
use proptest::prelude::*;

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..=10, 100u64..5_000, 1u64..60, 0.0f64..=1.0).prop_map(
        |(max_attempts, base_ms, max_secs, jitter_factor)| RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(base_ms) + Duration::from_secs(max_secs),
            jitter_factor,
        },
    )
}

proptest! {
    /// Jittered backoff never dips below the base delay and never exceeds
    /// the maximum, for any policy and attempt number.
    #[test]
    fn backoff_delay_always_within_policy_bounds(
        policy in policy_strategy(),
        attempt in 1u32..=12,
    ) {
        let delay = policy.backoff_delay(attempt);
        prop_assert!(delay >= policy.base_delay);
        prop_assert!(delay <= policy.max_delay);
    }

    /// The scheduler gives up exactly when the attempt budget is spent.
    #[test]
    fn retry_budget_is_exact(
        policy in policy_strategy(),
        attempt in 1u32..=20,
    ) {
        match policy.decide(attempt) {
            RetryDecision::GiveUp => prop_assert!(attempt >= policy.max_attempts),
            RetryDecision::Retry { .. } => prop_assert!(attempt < policy.max_attempts),
        }
    }

    /// Backoff grows monotonically with the attempt number when jitter is
    /// disabled.
    #[test]
    fn backoff_without_jitter_is_monotonic(
        policy in policy_strategy(),
        attempt in 1u32..=11,
    ) {
        let flat = RetryPolicy { jitter_factor: 0.0, ..policy };
        prop_assert!(flat.backoff_delay(attempt) <= flat.backoff_delay(attempt + 1));
    }

    /// A signature verifies with the signing secret and fails with any
    /// other secret, for arbitrary payloads.
    #[test]
    fn signing_round_trip(
        secret in "[a-zA-Z0-9]{8,32}",
        other_secret in "[a-zA-Z0-9]{8,32}",
        body in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let sig = signing::sign_payload(&secret, &body, Utc::now());

        prop_assert!(signing::verify_signature(
            &secret, &body, &sig.timestamp, &sig.nonce, &sig.signature
        ));

        if other_secret != secret {
            prop_assert!(!signing::verify_signature(
                &other_secret, &body, &sig.timestamp, &sig.nonce, &sig.signature
            ));
        }
    }

    /// Any single bit flip in the body invalidates the signature.
    #[test]
    fn signature_detects_payload_tampering(
        body in prop::collection::vec(any::<u8>(), 1..256),
        flip_index in any::<prop::sample::Index>(),
    ) {
        let sig = signing::sign_payload("s3cret", &body, Utc::now());

        let mut tampered = body.clone();
        let idx = flip_index.index(tampered.len());
        tampered[idx] ^= 0x01;

        prop_assert!(!signing::verify_signature(
            "s3cret", &tampered, &sig.timestamp, &sig.nonce, &sig.signature
        ));
    }
}
