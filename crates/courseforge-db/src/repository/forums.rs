//! Course forum repository — threads and posts.

use courseforge_common::models::community::{ForumPost, ForumThread};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================
// Threads
// ============================================================

/// Create a thread together with its opening post.
pub async fn create_thread(
    pool: &PgPool,
    thread_id: Uuid,
    post_id: Uuid,
    course_id: Uuid,
    author_id: Uuid,
    title: &str,
    body: &str,
) -> Result<(ForumThread, ForumPost), sqlx::Error> {
    let mut tx = pool.begin().await?;

    let thread = sqlx::query_as::<_, ForumThread>(
        r#"
        INSERT INTO forum_threads (id, course_id, author_id, title, locked, pinned,
                                   post_count, last_post_at, created_at)
        VALUES ($1, $2, $3, $4, false, false, 1, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(thread_id)
    .bind(course_id)
    .bind(author_id)
    .bind(title)
    .fetch_one(&mut *tx)
    .await?;

    let post = sqlx::query_as::<_, ForumPost>(
        r#"
        INSERT INTO forum_posts (id, thread_id, author_id, body, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING *
        "#,
    )
    .bind(post_id)
    .bind(thread_id)
    .bind(author_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok((thread, post))
}

pub async fn find_thread(
    pool: &PgPool,
    course_id: Uuid,
    thread_id: Uuid,
) -> Result<Option<ForumThread>, sqlx::Error> {
    sqlx::query_as::<_, ForumThread>("SELECT * FROM forum_threads WHERE id = $1 AND course_id = $2")
        .bind(thread_id)
        .bind(course_id)
        .fetch_optional(pool)
        .await
}

/// Pinned threads first, then by most recent activity.
pub async fn list_threads(
    pool: &PgPool,
    course_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<ForumThread>, sqlx::Error> {
    sqlx::query_as::<_, ForumThread>(
        r#"
        SELECT * FROM forum_threads
        WHERE course_id = $1
        ORDER BY pinned DESC, last_post_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(course_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn update_thread(
    pool: &PgPool,
    thread_id: Uuid,
    title: Option<&str>,
    locked: Option<bool>,
    pinned: Option<bool>,
) -> Result<ForumThread, sqlx::Error> {
    sqlx::query_as::<_, ForumThread>(
        r#"
        UPDATE forum_threads SET
            title = COALESCE($2, title),
            locked = COALESCE($3, locked),
            pinned = COALESCE($4, pinned)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(thread_id)
    .bind(title)
    .bind(locked)
    .bind(pinned)
    .fetch_one(pool)
    .await
}

// ============================================================
// Posts
// ============================================================

/// Append a reply and bump the thread's counters.
pub async fn create_post(
    pool: &PgPool,
    post_id: Uuid,
    thread_id: Uuid,
    author_id: Uuid,
    body: &str,
) -> Result<ForumPost, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let post = sqlx::query_as::<_, ForumPost>(
        r#"
        INSERT INTO forum_posts (id, thread_id, author_id, body, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING *
        "#,
    )
    .bind(post_id)
    .bind(thread_id)
    .bind(author_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE forum_threads SET post_count = post_count + 1, last_post_at = NOW() WHERE id = $1",
    )
    .bind(thread_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(post)
}

pub async fn list_posts(
    pool: &PgPool,
    thread_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<ForumPost>, sqlx::Error> {
    sqlx::query_as::<_, ForumPost>(
        r#"
        SELECT * FROM forum_posts
        WHERE thread_id = $1
        ORDER BY created_at
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(thread_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}
