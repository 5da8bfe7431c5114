//! Commerce routes — checkout, order history, entitlements.
//!
//! Paid courses go through the payment provider's hosted checkout; access is
//! granted when the signed webhook confirms payment (see `webhooks`). Free
//! courses are granted immediately.

use axum::{
    extract::{Extension, Path, Query, State},
    middleware,
    routing::{get, post},
    Json, Router,
};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::{
        commerce::{CheckoutResponse, Entitlement, Order, OrderStatus},
        email::AutomationTrigger,
    },
    snowflake,
};
use courseforge_db::repository::{email, entitlements, orders};
use std::sync::Arc;
use uuid::Uuid;

use super::{courses::load_visible_course, Pagination};
use crate::{middleware::AuthContext, AppState};

/// Commerce routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses/{course_id}/checkout", post(checkout))
        .route("/users/@me/orders", get(list_orders))
        .route("/users/@me/entitlements", get(list_entitlements))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

/// Hosted checkout URL for an order.
pub(crate) fn checkout_url(base: &str, order_id: Uuid) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}order={order_id}")
}

/// POST /api/v1/courses/{course_id}/checkout
async fn checkout(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<Json<CheckoutResponse>> {
    let course = load_visible_course(&state, &auth, course_id).await?;
    if !course.published {
        return Err(ForgeError::validation("Course is not published yet"));
    }

    if entitlements::find_active(&state.db.pg, auth.user_id, course_id)
        .await?
        .is_some()
    {
        return Err(ForgeError::Conflict {
            message: "You are already enrolled in this course".into(),
        });
    }

    let order_id = snowflake::generate_id();

    if course.is_free() {
        let order = orders::create_order(
            &state.db.pg,
            order_id,
            auth.user_id,
            course_id,
            0,
            &course.currency,
            OrderStatus::Paid,
        )
        .await?;
        let entitlement =
            entitlements::grant(&state.db.pg, auth.user_id, course_id, Some(order.id)).await?;
        email::enqueue_automations(
            &state.db.pg,
            course_id,
            AutomationTrigger::Enrollment,
            auth.user_id,
        )
        .await?;

        tracing::info!(course_id = %course_id, user_id = %auth.user_id, "Free enrollment");

        return Ok(Json(CheckoutResponse {
            order,
            checkout_url: None,
            entitlement: Some(entitlement),
        }));
    }

    let order = orders::create_order(
        &state.db.pg,
        order_id,
        auth.user_id,
        course_id,
        course.price_cents,
        &course.currency,
        OrderStatus::Pending,
    )
    .await?;

    let config = courseforge_common::config::get();
    tracing::info!(
        order_id = %order.id,
        course_id = %course_id,
        amount_cents = order.amount_cents,
        "Checkout started"
    );

    Ok(Json(CheckoutResponse {
        checkout_url: Some(checkout_url(&config.payments.checkout_base_url, order.id)),
        order,
        entitlement: None,
    }))
}

/// GET /api/v1/users/@me/orders
async fn list_orders(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> ForgeResult<Json<Vec<Order>>> {
    let (limit, _) = page.resolve(50);
    Ok(Json(orders::list_for_user(&state.db.pg, auth.user_id, limit).await?))
}

/// GET /api/v1/users/@me/entitlements — Active and revoked course access.
async fn list_entitlements(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<Vec<Entitlement>>> {
    Ok(Json(entitlements::list_for_user(&state.db.pg, auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_url_appends_the_order() {
        let id = Uuid::from_u128(7);
        assert_eq!(
            checkout_url("https://pay.example.com/c", id),
            format!("https://pay.example.com/c?order={id}")
        );
        assert_eq!(
            checkout_url("https://pay.example.com/c?ref=cf", id),
            format!("https://pay.example.com/c?ref=cf&order={id}")
        );
    }
}
