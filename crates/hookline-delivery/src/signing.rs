//! HMAC-SHA256 payload signing for outbound webhooks.
//!
//! Each delivery attempt is signed over `"{timestamp}.{nonce}.{body}"` so a
//! captured request cannot be replayed later with a fresh signature header.
//! The receiving end reconstructs the same message from the timestamp and
//! nonce headers and verifies with a timing-safe comparison.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Default header carrying the signature when the endpoint does not
/// configure one.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Header carrying the RFC 3339 timestamp the signature covers.
pub const TIMESTAMP_HEADER: &str = "X-Hookline-Timestamp";

/// Header carrying the per-attempt nonce the signature covers.
pub const NONCE_HEADER: &str = "X-Hookline-Nonce";

/// Signature material for one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadSignature {
    /// Signature header value, `sha256=<hex>`.
    pub signature: String,
    /// RFC 3339 timestamp covered by the signature.
    pub timestamp: String,
    /// Per-attempt nonce covered by the signature.
    pub nonce: String,
}

/// Signs a payload for delivery at the given time.
///
/// The nonce is freshly generated per call, so signing the same payload
/// twice yields distinct signatures.
pub fn sign_payload(secret: &str, body: &[u8], at: DateTime<Utc>) -> PayloadSignature {
    let timestamp = at.to_rfc3339();
    let nonce = Uuid::new_v4().simple().to_string();
    let digest = hmac_hex(secret, &signing_message(&timestamp, &nonce, body));

    PayloadSignature { signature: format!("sha256={digest}"), timestamp, nonce }
}

/// Verifies a signature header against the payload it claims to cover.
///
/// `signature` accepts the `sha256=<hex>` form or raw hex. Comparison is
/// timing-safe.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    timestamp: &str,
    nonce: &str,
    signature: &str,
) -> bool {
    let provided = signature.strip_prefix("sha256=").unwrap_or(signature);
    let expected = hmac_hex(secret, &signing_message(timestamp, nonce, body));
    timing_safe_eq(provided.as_bytes(), expected.as_bytes())
}

fn signing_message(timestamp: &str, nonce: &str, body: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + nonce.len() + body.len() + 2);
    message.extend_from_slice(timestamp.as_bytes());
    message.push(b'.');
    message.extend_from_slice(nonce.as_bytes());
    message.push(b'.');
    message.extend_from_slice(body);
    message
}

fn hmac_hex(secret: &str, message: &[u8]) -> String {
    // HMAC-SHA256 accepts keys of any length, so this cannot fail.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return String::new();
    };
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time byte comparison for signature verification.
fn timing_safe_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
