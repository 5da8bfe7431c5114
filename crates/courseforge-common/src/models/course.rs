//! Courses and lessons.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::drip::{DripError, DripPolicy, DripStatus};

/// A course listed for sale.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Course {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// URL-safe unique handle
    pub slug: String,
    pub description: Option<String>,
    /// Price in the currency's minor unit; 0 means free
    pub price_cents: i64,
    pub currency: String,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn is_free(&self) -> bool {
        self.price_cents == 0
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    pub slug: String,

    #[validate(length(max = 20_000))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: i64,

    pub currency: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCourseRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 20_000))]
    pub description: Option<String>,

    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price_cents: Option<i64>,

    pub published: Option<bool>,
}

// ============================================================
// Lessons
// ============================================================

/// Row from the `lessons` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Lesson {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub body: Option<String>,
    pub video_url: Option<String>,
    pub position: i32,
    pub drip_type: String,
    pub drip_days: Option<i32>,
    pub drip_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lesson {
    pub fn drip_policy(&self) -> Result<DripPolicy, DripError> {
        DripPolicy::from_columns(&self.drip_type, self.drip_days, self.drip_date)
    }
}

/// Lesson as returned to clients. Content is omitted while locked.
#[derive(Debug, Clone, Serialize)]
pub struct LessonResponse {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
    pub drip: DripPolicy,
    /// Present only for enrolled students
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<DripStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub completed: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 200_000))]
    pub body: Option<String>,

    #[validate(url(message = "video_url must be a URL"))]
    pub video_url: Option<String>,

    pub position: Option<i32>,

    /// Defaults to immediate
    pub drip: Option<DripPolicy>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateLessonRequest {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: Option<String>,

    #[validate(length(max = 200_000))]
    pub body: Option<String>,

    #[validate(url(message = "video_url must be a URL"))]
    pub video_url: Option<String>,

    pub position: Option<i32>,

    pub drip: Option<DripPolicy>,
}

/// Row from `lesson_progress`.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LessonProgress {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub completed_at: DateTime<Utc>,
}
