//! Payment provider webhook.
//!
//! `POST /webhooks/payments` is unauthenticated; every request must carry a
//! valid `x-payment-signature` over the raw body. Order transitions only move
//! forward, so provider retries and out-of-order deliveries are harmless.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::{commerce::OrderStatus, email::AutomationTrigger},
    payments::{
        next_order_status, verify_signature, PaymentEvent, PaymentEventKind, SignatureError,
        SIGNATURE_HEADER,
    },
};
use courseforge_db::repository::{email, entitlements, orders};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

/// Webhook routes (no auth middleware).
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/webhooks/payments", post(payment_webhook))
}

/// POST /api/v1/webhooks/payments
async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ForgeResult<Json<serde_json::Value>> {
    let config = courseforge_common::config::get();

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::Malformed)?;
    verify_signature(
        &config.payments.webhook_secret,
        signature,
        &body,
        Utc::now().timestamp(),
        config.payments.signature_tolerance_secs,
    )?;

    let event: PaymentEvent = serde_json::from_slice(&body)
        .map_err(|e| ForgeError::validation(format!("Malformed event: {e}")))?;
    let kind = event.kind();

    if kind == PaymentEventKind::Ignored {
        tracing::debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring payment event");
        return Ok(Json(json!({ "received": true })));
    }

    let mut tx = state.db.pg.begin().await?;
    let order = orders::find_for_update(&mut tx, event.data.order_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Order"))?;

    let amount_matches = event
        .data
        .amount_cents
        .is_none_or(|amount| amount == order.amount_cents);
    if !amount_matches {
        tracing::warn!(
            order_id = %order.id,
            expected = order.amount_cents,
            received = ?event.data.amount_cents,
            "Payment amount mismatch"
        );
    }

    let next = next_order_status(order.status, kind, amount_matches);
    match next {
        Some(OrderStatus::Paid) => {
            orders::set_status(&mut tx, order.id, OrderStatus::Paid, event.data.session_id.as_deref())
                .await?;
            entitlements::grant(&mut *tx, order.user_id, order.course_id, Some(order.id)).await?;
        }
        Some(OrderStatus::Refunded) => {
            orders::set_status(&mut tx, order.id, OrderStatus::Refunded, None).await?;
            entitlements::revoke_for_order(&mut *tx, order.id).await?;
        }
        Some(status) => {
            orders::set_status(&mut tx, order.id, status, event.data.session_id.as_deref()).await?;
        }
        None => {
            tracing::debug!(order_id = %order.id, status = ?order.status, kind = ?kind, "Order unchanged");
        }
    }

    tx.commit().await?;

    if next == Some(OrderStatus::Paid) {
        email::enqueue_automations(
            &state.db.pg,
            order.course_id,
            AutomationTrigger::Enrollment,
            order.user_id,
        )
        .await?;
    }

    tracing::info!(
        event_id = %event.id,
        order_id = %order.id,
        kind = ?kind,
        from = ?order.status,
        to = ?next,
        "Payment event processed"
    );

    Ok(Json(json!({ "received": true })))
}
