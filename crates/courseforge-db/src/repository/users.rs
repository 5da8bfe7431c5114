//! User repository — CRUD operations for user accounts.

use courseforge_common::models::user::{User, UserRole};
use sqlx::PgPool;
use uuid::Uuid;

/// Create a new user account.
pub async fn create_user(
    pool: &PgPool,
    id: Uuid,
    email: &str,
    display_name: &str,
    password_hash: &str,
    role: UserRole,
) -> Result<User, sqlx::Error> {
    sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, email, display_name, password_hash, role, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(email)
    .bind(display_name)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await
}

/// Find a user by their unique ID.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Find a user by email (case-insensitive).
pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, sqlx::Error> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
        .bind(email)
        .fetch_optional(pool)
        .await
}

/// Record a client heartbeat.
pub async fn touch_last_seen(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE users SET last_seen_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Emails of everyone holding an active entitlement to one of the owner's
/// courses (or to `course_id` only, when given).
pub async fn audience_emails(
    pool: &PgPool,
    owner_id: Uuid,
    course_id: Option<Uuid>,
) -> Result<Vec<(Uuid, String)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT DISTINCT u.id, u.email
        FROM users u
        JOIN entitlements e ON e.user_id = u.id AND e.revoked_at IS NULL
        JOIN courses c ON c.id = e.course_id
        WHERE c.owner_id = $1
          AND ($2::uuid IS NULL OR c.id = $2)
        ORDER BY u.id
        "#,
    )
    .bind(owner_id)
    .bind(course_id)
    .fetch_all(pool)
    .await
}
