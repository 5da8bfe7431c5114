//! Course repository.

use courseforge_common::models::course::Course;
use sqlx::PgPool;
use uuid::Uuid;

#[allow(clippy::too_many_arguments)]
pub async fn create_course(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    title: &str,
    slug: &str,
    description: Option<&str>,
    price_cents: i64,
    currency: &str,
) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        INSERT INTO courses (id, owner_id, title, slug, description, price_cents, currency,
                             published, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, LOWER($7), false, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(title)
    .bind(slug)
    .bind(description)
    .bind(price_cents)
    .bind(currency)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn find_by_slug(pool: &PgPool, slug: &str) -> Result<Option<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// Published catalogue, newest first, optionally filtered by a title search.
pub async fn list_published(
    pool: &PgPool,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        SELECT * FROM courses
        WHERE published = true
          AND ($1::text IS NULL OR title ILIKE '%' || $1 || '%')
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(search)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Every course a creator owns, drafts included.
pub async fn list_by_owner(pool: &PgPool, owner_id: Uuid) -> Result<Vec<Course>, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Update course fields; `None` leaves a field unchanged.
pub async fn update_course(
    pool: &PgPool,
    id: Uuid,
    title: Option<&str>,
    description: Option<&str>,
    price_cents: Option<i64>,
    published: Option<bool>,
) -> Result<Course, sqlx::Error> {
    sqlx::query_as::<_, Course>(
        r#"
        UPDATE courses SET
            title = COALESCE($2, title),
            description = COALESCE($3, description),
            price_cents = COALESCE($4, price_cents),
            published = COALESCE($5, published),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(title)
    .bind(description)
    .bind(price_cents)
    .bind(published)
    .fetch_one(pool)
    .await
}

pub async fn delete_course(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM courses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
