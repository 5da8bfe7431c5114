//! Video batch jobs and their items.

use courseforge_common::models::video::{BatchStatus, VideoBatchItem, VideoBatchJob, VideoBrief};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

/// Create a job and its items in one transaction.
pub async fn create_job(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    course_id: Option<Uuid>,
    briefs: &[VideoBrief],
) -> Result<VideoBatchJob, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let job = sqlx::query_as::<_, VideoBatchJob>(
        r#"
        INSERT INTO video_batch_jobs (id, owner_id, course_id, status, total_items,
                                      completed_items, failed_items, created_at, updated_at)
        VALUES ($1, $2, $3, 'pending', $4, 0, 0, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(course_id)
    .bind(briefs.len() as i32)
    .fetch_one(&mut *tx)
    .await?;

    for (position, brief) in briefs.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO video_batch_items (id, job_id, position, brief, status, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(id)
        .bind(position as i32)
        .bind(Json(brief))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(job)
}

pub async fn find_job(pool: &PgPool, id: Uuid) -> Result<Option<VideoBatchJob>, sqlx::Error> {
    sqlx::query_as::<_, VideoBatchJob>("SELECT * FROM video_batch_jobs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_jobs(pool: &PgPool, owner_id: Uuid, limit: i64) -> Result<Vec<VideoBatchJob>, sqlx::Error> {
    sqlx::query_as::<_, VideoBatchJob>(
        "SELECT * FROM video_batch_jobs WHERE owner_id = $1 ORDER BY created_at DESC LIMIT $2",
    )
    .bind(owner_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn list_items(pool: &PgPool, job_id: Uuid) -> Result<Vec<VideoBatchItem>, sqlx::Error> {
    sqlx::query_as::<_, VideoBatchItem>(
        "SELECT * FROM video_batch_items WHERE job_id = $1 ORDER BY position",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await
}

/// Flip a job into `processing`. Returns false if another run already holds it.
pub async fn mark_job_processing(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE video_batch_jobs SET
            status = 'processing',
            error = NULL,
            started_at = NOW(),
            finished_at = NULL,
            updated_at = NOW()
        WHERE id = $1 AND status IN ('pending', 'failed')
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Fail every job still marked `processing`. Used at startup, when no run can
/// legitimately be in flight. Returns the ids that were reclaimed.
pub async fn fail_interrupted_jobs(pool: &PgPool, error: &str) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE video_batch_jobs SET
            status = 'failed',
            error = $1,
            finished_at = NOW(),
            updated_at = NOW()
        WHERE status = 'processing'
        RETURNING id
        "#,
    )
    .bind(error)
    .fetch_all(pool)
    .await
}

pub async fn finish_job(
    pool: &PgPool,
    id: Uuid,
    status: BatchStatus,
    completed_items: i32,
    failed_items: i32,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE video_batch_jobs SET
            status = $2,
            completed_items = $3,
            failed_items = $4,
            error = $5,
            finished_at = NOW(),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(completed_items)
    .bind(failed_items)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_item(
    pool: &PgPool,
    item_id: Uuid,
    status: BatchStatus,
    video_url: Option<&str>,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE video_batch_items SET
            status = $2,
            video_url = COALESCE($3, video_url),
            error = $4,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(item_id)
    .bind(status)
    .bind(video_url)
    .bind(error)
    .execute(pool)
    .await?;
    Ok(())
}
