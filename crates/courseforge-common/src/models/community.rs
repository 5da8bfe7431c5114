//! Course forums and direct messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

// ============================================================
// Forums
// ============================================================

/// A discussion thread inside a course's forum.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumThread {
    pub id: Uuid,
    pub course_id: Uuid,
    pub author_id: Uuid,
    pub title: String,
    pub locked: bool,
    pub pinned: bool,
    pub post_count: i32,
    pub last_post_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ForumPost {
    pub id: Uuid,
    pub thread_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateThreadRequest {
    #[validate(length(min = 1, max = 200, message = "Thread title must be 1-200 characters"))]
    pub title: String,

    /// Opening post
    #[validate(length(min = 1, message = "Post body must not be empty"))]
    pub body: String,
}

/// Moderation update — course owner only.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateThreadRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub locked: Option<bool>,
    pub pinned: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(min = 1, message = "Post body must not be empty"))]
    pub body: String,
}

// ============================================================
// Direct messages
// ============================================================

/// A 1:1 conversation. `user_a` always sorts before `user_b`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DmConversation {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl DmConversation {
    pub fn includes(&self, user_id: Uuid) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    pub fn other(&self, user_id: Uuid) -> Uuid {
        if self.user_a == user_id { self.user_b } else { self.user_a }
    }
}

/// Order two participants the way `dm_conversations` stores them.
pub fn conversation_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DmMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub recipient_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendDmRequest {
    #[validate(length(min = 1, max = 4000, message = "Message must be 1-4000 characters"))]
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_pair_is_order_independent() {
        let a = Uuid::from_u128(1);
        let b = Uuid::from_u128(2);
        assert_eq!(conversation_pair(a, b), conversation_pair(b, a));
        assert_eq!(conversation_pair(b, a), (a, b));
    }
}
