//! Direct message repository.

use chrono::{DateTime, Utc};
use courseforge_common::models::community::{conversation_pair, DmConversation, DmMessage};
use sqlx::PgPool;
use uuid::Uuid;

/// Find or create the conversation between two users.
pub async fn open_conversation(
    pool: &PgPool,
    id: Uuid,
    a: Uuid,
    b: Uuid,
) -> Result<DmConversation, sqlx::Error> {
    let (user_a, user_b) = conversation_pair(a, b);
    // The no-op update makes RETURNING yield the existing row on conflict
    sqlx::query_as::<_, DmConversation>(
        r#"
        INSERT INTO dm_conversations (id, user_a, user_b, created_at)
        VALUES ($1, $2, $3, NOW())
        ON CONFLICT (user_a, user_b) DO UPDATE SET user_a = EXCLUDED.user_a
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(user_a)
    .bind(user_b)
    .fetch_one(pool)
    .await
}

pub async fn find_conversation(pool: &PgPool, id: Uuid) -> Result<Option<DmConversation>, sqlx::Error> {
    sqlx::query_as::<_, DmConversation>("SELECT * FROM dm_conversations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_conversations(pool: &PgPool, user_id: Uuid) -> Result<Vec<DmConversation>, sqlx::Error> {
    sqlx::query_as::<_, DmConversation>(
        r#"
        SELECT * FROM dm_conversations
        WHERE user_a = $1 OR user_b = $1
        ORDER BY last_message_at DESC NULLS LAST, created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn send_message(
    pool: &PgPool,
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    body: &str,
) -> Result<DmMessage, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let message = sqlx::query_as::<_, DmMessage>(
        r#"
        INSERT INTO dm_messages (id, conversation_id, sender_id, body, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(conversation_id)
    .bind(sender_id)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE dm_conversations SET last_message_at = $2 WHERE id = $1")
        .bind(conversation_id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(message)
}

/// Newest first, paging backwards with `before`.
pub async fn list_messages(
    pool: &PgPool,
    conversation_id: Uuid,
    before: Option<DateTime<Utc>>,
    limit: i64,
) -> Result<Vec<DmMessage>, sqlx::Error> {
    sqlx::query_as::<_, DmMessage>(
        r#"
        SELECT * FROM dm_messages
        WHERE conversation_id = $1
          AND ($2::timestamptz IS NULL OR created_at < $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
    )
    .bind(conversation_id)
    .bind(before)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Mark everything the other participant sent as read.
pub async fn mark_read(pool: &PgPool, conversation_id: Uuid, reader_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE dm_messages SET read_at = NOW()
        WHERE conversation_id = $1 AND sender_id <> $2 AND read_at IS NULL
        "#,
    )
    .bind(conversation_id)
    .bind(reader_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
