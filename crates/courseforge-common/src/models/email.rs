//! Email marketing: scheduled programs, event-driven automations, and the
//! send queue both of them feed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A recurring broadcast on a cron schedule.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailProgram {
    pub id: Uuid,
    pub owner_id: Uuid,
    /// Audience is the course's enrolled students; None means all of the
    /// owner's students
    pub course_id: Option<Uuid>,
    pub name: String,
    pub subject: String,
    pub body: String,
    /// What the creator typed, e.g. "every monday at 9am"
    pub schedule_text: String,
    /// Derived five-field cron expression
    pub cron: String,
    /// IANA timezone the cron is evaluated in
    pub timezone: String,
    pub active: bool,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEmailProgramRequest {
    #[validate(length(min = 1, max = 120, message = "Name must be 1-120 characters"))]
    pub name: String,

    #[validate(length(min = 1, max = 200, message = "Subject must be 1-200 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 100_000, message = "Body must not be empty"))]
    pub body: String,

    #[validate(length(min = 1, max = 120, message = "Schedule must be 1-120 characters"))]
    pub schedule: String,

    pub timezone: Option<String>,

    pub course_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateEmailProgramRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 200))]
    pub subject: Option<String>,

    #[validate(length(min = 1, max = 100_000))]
    pub body: Option<String>,

    #[validate(length(min = 1, max = 120))]
    pub schedule: Option<String>,

    pub timezone: Option<String>,

    pub active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SchedulePreviewRequest {
    #[validate(length(min = 1, max = 120))]
    pub schedule: String,
    pub timezone: Option<String>,
    #[validate(range(min = 1, max = 20))]
    pub count: Option<usize>,
}

// ============================================================
// Automations
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AutomationTrigger {
    Enrollment,
    LessonCompleted,
    CourseCompleted,
}

/// A one-off email sent `delay_minutes` after a learner event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailAutomation {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_id: Uuid,
    pub trigger: AutomationTrigger,
    pub delay_minutes: i32,
    pub subject: String,
    pub body: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAutomationRequest {
    pub course_id: Uuid,
    pub trigger: AutomationTrigger,

    #[validate(range(min = 0, max = 525_600, message = "Delay must be 0-525600 minutes"))]
    pub delay_minutes: i32,

    #[validate(length(min = 1, max = 200))]
    pub subject: String,

    #[validate(length(min = 1, max = 100_000))]
    pub body: String,
}

// ============================================================
// Send queue
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Queued,
    Sent,
    Failed,
}

/// One queued email for one recipient. Delivery is handed to the email provider.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EmailSend {
    pub id: Uuid,
    pub program_id: Option<Uuid>,
    pub automation_id: Option<Uuid>,
    pub user_id: Uuid,
    pub status: SendStatus,
    pub scheduled_for: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
