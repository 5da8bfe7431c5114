//! Coaching slot repository.

use chrono::{DateTime, Utc};
use courseforge_common::models::coaching::CoachingSlot;
use sqlx::PgPool;
use uuid::Uuid;

pub async fn create_slot(
    pool: &PgPool,
    id: Uuid,
    coach_id: Uuid,
    course_id: Option<Uuid>,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<CoachingSlot, sqlx::Error> {
    sqlx::query_as::<_, CoachingSlot>(
        r#"
        INSERT INTO coaching_slots (id, coach_id, course_id, starts_at, ends_at, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(coach_id)
    .bind(course_id)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_one(pool)
    .await
}

pub async fn find_slot(pool: &PgPool, id: Uuid) -> Result<Option<CoachingSlot>, sqlx::Error> {
    sqlx::query_as::<_, CoachingSlot>("SELECT * FROM coaching_slots WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// True if the coach already has a slot overlapping `[starts_at, ends_at)`.
pub async fn overlaps(
    pool: &PgPool,
    coach_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT 1 FROM coaching_slots
        WHERE coach_id = $1 AND starts_at < $3 AND ends_at > $2
        LIMIT 1
        "#,
    )
    .bind(coach_id)
    .bind(starts_at)
    .bind(ends_at)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

/// Upcoming slots. `coach_id` narrows to one coach; `open_only` hides booked slots.
pub async fn list_upcoming(
    pool: &PgPool,
    coach_id: Option<Uuid>,
    open_only: bool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<CoachingSlot>, sqlx::Error> {
    sqlx::query_as::<_, CoachingSlot>(
        r#"
        SELECT * FROM coaching_slots
        WHERE starts_at > $1
          AND ($2::uuid IS NULL OR coach_id = $2)
          AND (NOT $3 OR booked_by IS NULL)
        ORDER BY starts_at
        LIMIT $4
        "#,
    )
    .bind(now)
    .bind(coach_id)
    .bind(open_only)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Atomically claim an open slot. Returns None if someone else holds it.
pub async fn book_slot(
    pool: &PgPool,
    id: Uuid,
    user_id: Uuid,
    note: Option<&str>,
) -> Result<Option<CoachingSlot>, sqlx::Error> {
    sqlx::query_as::<_, CoachingSlot>(
        r#"
        UPDATE coaching_slots SET booked_by = $2, booked_at = NOW(), note = $3
        WHERE id = $1 AND booked_by IS NULL
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(note)
    .fetch_optional(pool)
    .await
}

/// Release a booking held by `user_id`.
pub async fn cancel_booking(pool: &PgPool, id: Uuid, user_id: Uuid) -> Result<Option<CoachingSlot>, sqlx::Error> {
    sqlx::query_as::<_, CoachingSlot>(
        r#"
        UPDATE coaching_slots SET booked_by = NULL, booked_at = NULL, note = NULL
        WHERE id = $1 AND booked_by = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}
