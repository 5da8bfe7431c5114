//! Coaching session slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A bookable block of a coach's time.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CoachingSlot {
    pub id: Uuid,
    pub coach_id: Uuid,
    /// Restrict booking to students of this course
    pub course_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub booked_by: Option<Uuid>,
    pub booked_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSlotRequest {
    pub course_id: Option<Uuid>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BookSlotRequest {
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}
