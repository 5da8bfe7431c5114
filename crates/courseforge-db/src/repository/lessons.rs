//! Lesson repository.

use chrono::{DateTime, Utc};
use courseforge_common::models::course::Lesson;
use sqlx::PgPool;
use uuid::Uuid;

/// Drip columns as stored: `(drip_type, drip_days, drip_date)`.
pub type DripColumns<'a> = (&'a str, Option<i32>, Option<DateTime<Utc>>);

#[allow(clippy::too_many_arguments)]
pub async fn create_lesson(
    pool: &PgPool,
    id: Uuid,
    course_id: Uuid,
    title: &str,
    body: Option<&str>,
    video_url: Option<&str>,
    position: Option<i32>,
    drip: DripColumns<'_>,
) -> Result<Lesson, sqlx::Error> {
    // Append to the end of the course unless a position was given
    sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (id, course_id, title, body, video_url, position,
                             drip_type, drip_days, drip_date, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5,
                COALESCE($6, (SELECT COALESCE(MAX(position) + 1, 0) FROM lessons WHERE course_id = $2)),
                $7, $8, $9, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(course_id)
    .bind(title)
    .bind(body)
    .bind(video_url)
    .bind(position)
    .bind(drip.0)
    .bind(drip.1)
    .bind(drip.2)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    course_id: Uuid,
    lesson_id: Uuid,
) -> Result<Option<Lesson>, sqlx::Error> {
    sqlx::query_as::<_, Lesson>("SELECT * FROM lessons WHERE id = $1 AND course_id = $2")
        .bind(lesson_id)
        .bind(course_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_for_course(pool: &PgPool, course_id: Uuid) -> Result<Vec<Lesson>, sqlx::Error> {
    sqlx::query_as::<_, Lesson>(
        "SELECT * FROM lessons WHERE course_id = $1 ORDER BY position, created_at",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
}

/// Update lesson content. Drip columns are replaced together when given.
#[allow(clippy::too_many_arguments)]
pub async fn update_lesson(
    pool: &PgPool,
    lesson_id: Uuid,
    title: Option<&str>,
    body: Option<&str>,
    video_url: Option<&str>,
    position: Option<i32>,
    drip: Option<DripColumns<'_>>,
) -> Result<Lesson, sqlx::Error> {
    let (drip_set, drip_type, drip_days, drip_date) = match drip {
        Some((t, d, dt)) => (true, Some(t), d, dt),
        None => (false, None, None, None),
    };

    sqlx::query_as::<_, Lesson>(
        r#"
        UPDATE lessons SET
            title = COALESCE($2, title),
            body = COALESCE($3, body),
            video_url = COALESCE($4, video_url),
            position = COALESCE($5, position),
            drip_type = CASE WHEN $6 THEN $7 ELSE drip_type END,
            drip_days = CASE WHEN $6 THEN $8 ELSE drip_days END,
            drip_date = CASE WHEN $6 THEN $9 ELSE drip_date END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(lesson_id)
    .bind(title)
    .bind(body)
    .bind(video_url)
    .bind(position)
    .bind(drip_set)
    .bind(drip_type)
    .bind(drip_days)
    .bind(drip_date)
    .fetch_one(pool)
    .await
}

pub async fn count_for_course(pool: &PgPool, course_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM lessons WHERE course_id = $1")
        .bind(course_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
