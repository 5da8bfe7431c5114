//! Batch video generation jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl BatchStatus {
    /// Items in these states are (re)attempted when a batch runs.
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

/// What to render for one video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VideoBrief {
    #[validate(length(min = 1, max = 200, message = "Brief title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 20_000, message = "Brief script must not be empty"))]
    pub script: String,

    pub avatar_id: Option<String>,
    pub voice_id: Option<String>,
}

/// Row from `video_batch_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoBatchJob {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub status: BatchStatus,
    pub total_items: i32,
    pub completed_items: i32,
    pub failed_items: i32,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row from `video_batch_items`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoBatchItem {
    pub id: Uuid,
    pub job_id: Uuid,
    pub position: i32,
    pub brief: sqlx::types::Json<VideoBrief>,
    pub status: BatchStatus,
    pub video_url: Option<String>,
    pub error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateVideoBatchRequest {
    pub course_id: Option<Uuid>,

    #[validate(length(min = 1, message = "A batch needs at least one brief"), nested)]
    pub briefs: Vec<VideoBrief>,
}

#[derive(Debug, Serialize)]
pub struct VideoBatchResponse {
    #[serde(flatten)]
    pub job: VideoBatchJob,
    pub items: Vec<VideoBatchItem>,
}
