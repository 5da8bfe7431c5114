//! Payment-provider webhook verification.
//!
//! The provider signs each webhook with HMAC-SHA256 over `"<timestamp>.<raw body>"`
//! and sends `t=<unix seconds>,v1=<hex digest>` in the signature header.
//! Several `v1` entries may be present while secrets are being rotated.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::models::commerce::OrderStatus;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("webhook secret is not configured")]
    NotConfigured,
    #[error("missing or malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: i64, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::NotConfigured)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Produce the signature header the provider would send for `body`.
pub fn signature_header(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let digest = mac_for(secret, timestamp, body)?.finalize().into_bytes();
    Ok(format!("t={timestamp},v1={}", hex::encode(digest)))
}

/// Verify a webhook signature header against the raw request body.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
    tolerance_secs: i64,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::NotConfigured);
    }

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => {
                if let Ok(bytes) = hex::decode(v) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    let tolerance = u64::try_from(tolerance_secs).unwrap_or(0);
    if now.abs_diff(timestamp) > tolerance {
        return Err(SignatureError::Expired);
    }

    let mac = mac_for(secret, timestamp, body)?;
    let matched = signatures
        .iter()
        .any(|sig| mac.clone().verify_slice(sig).is_ok());
    if matched { Ok(()) } else { Err(SignatureError::Mismatch) }
}

// ============================================================
// Events
// ============================================================

/// Webhook envelope. Only the fields we act on are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: PaymentEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEventData {
    /// Our order ID, passed to the provider as checkout metadata.
    pub order_id: Uuid,
    pub session_id: Option<String>,
    pub amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentEventKind {
    CheckoutCompleted,
    PaymentFailed,
    Refunded,
    Ignored,
}

impl PaymentEvent {
    pub fn kind(&self) -> PaymentEventKind {
        match self.event_type.as_str() {
            "checkout.session.completed" => PaymentEventKind::CheckoutCompleted,
            "payment_intent.payment_failed" | "checkout.session.expired" => {
                PaymentEventKind::PaymentFailed
            }
            "charge.refunded" => PaymentEventKind::Refunded,
            _ => PaymentEventKind::Ignored,
        }
    }
}

/// Where an order moves when `kind` arrives, or `None` to leave it alone.
///
/// Transitions only move forward: `Refunded` is terminal, a paid order is
/// never re-paid or failed, and an amount mismatch only fails a pending order.
pub fn next_order_status(
    current: OrderStatus,
    kind: PaymentEventKind,
    amount_matches: bool,
) -> Option<OrderStatus> {
    use OrderStatus::*;

    match (kind, current) {
        (PaymentEventKind::CheckoutCompleted, Pending) if !amount_matches => Some(Failed),
        (PaymentEventKind::CheckoutCompleted, Pending | Failed) if amount_matches => Some(Paid),
        (PaymentEventKind::PaymentFailed, Pending) => Some(Failed),
        (PaymentEventKind::Refunded, Paid) => Some(Refunded),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const BODY: &[u8] = br#"{"id":"evt_1","type":"checkout.session.completed"}"#;

    #[test]
    fn valid_signature_verifies() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        assert_eq!(verify_signature(SECRET, &header, BODY, 1_700_000_010, 300), Ok(()));
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, &header, b"{}", 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let header = signature_header("other", 1_700_000_000, BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, &header, BODY, 1_700_000_000, 300),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        assert_eq!(
            verify_signature(SECRET, &header, BODY, 1_700_000_301, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rotated_secrets_accept_any_matching_entry() {
        let good = signature_header(SECRET, 1_700_000_000, BODY).unwrap();
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t=1700000000,v1={},v1={v1}", "00".repeat(32));
        assert_eq!(verify_signature(SECRET, &header, BODY, 1_700_000_000, 300), Ok(()));
    }

    #[test]
    fn malformed_headers_and_missing_secret() {
        assert_eq!(verify_signature(SECRET, "garbage", BODY, 0, 300), Err(SignatureError::Malformed));
        assert_eq!(verify_signature(SECRET, "t=5", BODY, 5, 300), Err(SignatureError::Malformed));
        assert_eq!(verify_signature("", "t=5,v1=00", BODY, 5, 300), Err(SignatureError::NotConfigured));
        assert_eq!(
            verify_signature(SECRET, "t=-9223372036854775808,v1=00", b"{}", 1_700_000_000, 300),
            Err(SignatureError::Expired)
        );
        assert_eq!(
            verify_signature(SECRET, "t=9223372036854775807,v1=00", b"{}", i64::MIN, 300),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn event_kinds() {
        let event: PaymentEvent = serde_json::from_value(serde_json::json!({
            "id": "evt_1",
            "type": "charge.refunded",
            "data": { "order_id": "01929a5e-6e1b-7000-9c4a-dead00000001" }
        }))
        .unwrap();
        assert_eq!(event.kind(), PaymentEventKind::Refunded);
    }

    #[test]
    fn checkout_pays_pending_and_failed_orders_once() {
        use OrderStatus::*;
        let done = PaymentEventKind::CheckoutCompleted;

        assert_eq!(next_order_status(Pending, done, true), Some(Paid));
        assert_eq!(next_order_status(Failed, done, true), Some(Paid));
        // Redelivery of the same completion grants nothing new
        assert_eq!(next_order_status(Paid, done, true), None);
    }

    #[test]
    fn refunded_orders_are_terminal() {
        use OrderStatus::*;

        assert_eq!(next_order_status(Paid, PaymentEventKind::Refunded, true), Some(Refunded));
        assert_eq!(next_order_status(Refunded, PaymentEventKind::CheckoutCompleted, true), None);
        assert_eq!(next_order_status(Refunded, PaymentEventKind::PaymentFailed, true), None);
        assert_eq!(next_order_status(Refunded, PaymentEventKind::Refunded, true), None);
    }

    #[test]
    fn amount_mismatch_only_fails_pending_orders() {
        use OrderStatus::*;
        let done = PaymentEventKind::CheckoutCompleted;

        assert_eq!(next_order_status(Pending, done, false), Some(Failed));
        assert_eq!(next_order_status(Paid, done, false), None);
        assert_eq!(next_order_status(Failed, done, false), None);
    }

    #[test]
    fn failures_and_ignored_events() {
        use OrderStatus::*;

        assert_eq!(next_order_status(Pending, PaymentEventKind::PaymentFailed, true), Some(Failed));
        assert_eq!(next_order_status(Paid, PaymentEventKind::PaymentFailed, true), None);
        assert_eq!(next_order_status(Pending, PaymentEventKind::Refunded, true), None);
        assert_eq!(next_order_status(Pending, PaymentEventKind::Ignored, true), None);
    }
}
