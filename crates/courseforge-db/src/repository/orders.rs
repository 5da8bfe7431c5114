//! Order repository.

use courseforge_common::models::commerce::{Order, OrderStatus};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

pub async fn create_order(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    course_id: Uuid,
    amount_cents: i64,
    currency: &str,
    status: OrderStatus,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        INSERT INTO orders (id, user_id, course_id, amount_cents, currency, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(course_id)
    .bind(amount_cents)
    .bind(currency)
    .bind(status)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Lock an order row for the duration of a webhook transaction.
pub async fn find_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid, limit: i64) -> Result<Vec<Order>, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn set_status(
    tx: &mut Transaction<'_, Postgres>,
    id: Uuid,
    status: OrderStatus,
    provider_session_id: Option<&str>,
) -> Result<Order, sqlx::Error> {
    sqlx::query_as::<_, Order>(
        r#"
        UPDATE orders SET
            status = $2,
            provider_session_id = COALESCE($3, provider_session_id),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(provider_session_id)
    .fetch_one(&mut **tx)
    .await
}
