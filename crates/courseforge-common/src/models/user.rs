//! User model — students, creators, and admins.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A Courseforge account.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    /// Unique user ID (UUID v7 — time-sortable)
    pub id: Uuid,

    /// Login email, unique case-insensitively
    pub email: String,

    pub display_name: String,

    /// Argon2id password hash
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub role: UserRole,

    /// Last client heartbeat
    pub last_seen_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Buys and takes courses
    Student,
    /// Publishes courses, runs email programs, generates videos
    Creator,
    /// Platform staff
    Admin,
}

impl UserRole {
    pub fn can_publish(&self) -> bool {
        matches!(self, Self::Creator | Self::Admin)
    }
}

/// Registration request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 64, message = "Display name must be 1-64 characters"))]
    pub display_name: String,

    /// Register as a creator instead of a student
    #[serde(default)]
    pub creator: bool,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Public user representation.
#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            email: u.email,
            display_name: u.display_name,
            role: u.role,
            created_at: u.created_at,
        }
    }
}

/// Row from `learning_streaks`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LearningStreak {
    pub user_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl LearningStreak {
    pub fn state(&self) -> crate::streak::StreakState {
        crate::streak::StreakState {
            current: self.current_streak,
            longest: self.longest_streak,
            last_activity: self.last_activity_date,
        }
    }
}

/// Streak as shown to the learner.
#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_activity_date: Option<NaiveDate>,
    pub active: bool,
}
