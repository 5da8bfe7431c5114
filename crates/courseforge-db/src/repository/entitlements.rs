//! Entitlement repository — who may access which course.

use courseforge_common::models::commerce::Entitlement;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

/// Grant (or re-grant) access. Idempotent: a second grant keeps the original
/// `granted_at` so drip schedules do not restart.
pub async fn grant<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    course_id: Uuid,
    order_id: Option<Uuid>,
) -> Result<Entitlement, sqlx::Error> {
    sqlx::query_as::<_, Entitlement>(
        r#"
        INSERT INTO entitlements (user_id, course_id, order_id, granted_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (user_id, course_id) DO UPDATE SET
            order_id = COALESCE(EXCLUDED.order_id, entitlements.order_id),
            revoked_at = NULL
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(order_id)
    .fetch_one(executor)
    .await
}

/// Revoke access granted by a specific order (refunds).
pub async fn revoke_for_order<'e>(
    executor: impl PgExecutor<'e>,
    order_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE entitlements SET revoked_at = NOW() WHERE order_id = $1 AND revoked_at IS NULL",
    )
    .bind(order_id)
    .execute(executor)
    .await?;
    Ok(result.rows_affected())
}

/// Active entitlement for one user on one course.
pub async fn find_active(
    pool: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Option<Entitlement>, sqlx::Error> {
    sqlx::query_as::<_, Entitlement>(
        r#"
        SELECT * FROM entitlements
        WHERE user_id = $1 AND course_id = $2 AND revoked_at IS NULL
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Entitlement>, sqlx::Error> {
    sqlx::query_as::<_, Entitlement>(
        r#"
        SELECT * FROM entitlements
        WHERE user_id = $1 AND revoked_at IS NULL
        ORDER BY granted_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// Student IDs with active access to a course.
pub async fn list_student_ids(pool: &PgPool, course_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "SELECT user_id FROM entitlements WHERE course_id = $1 AND revoked_at IS NULL",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}
