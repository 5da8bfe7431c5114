//! Creator dashboard aggregates.

use serde::Serialize;
use uuid::Uuid;

/// Per-course numbers for the creator dashboard.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CourseAnalytics {
    pub course_id: Uuid,
    pub enrollments: i64,
    pub revenue_cents: i64,
    pub refunds: i64,
    pub lessons: i64,
    /// Students who completed every lesson
    pub completions: i64,
    pub forum_threads: i64,
}

impl CourseAnalytics {
    /// Share of enrolled students who finished, in percent.
    pub fn completion_rate(&self) -> f64 {
        if self.enrollments == 0 {
            0.0
        } else {
            (self.completions as f64 / self.enrollments as f64) * 100.0
        }
    }
}

/// Totals across all of a creator's courses.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CreatorOverview {
    pub courses: i64,
    pub published_courses: i64,
    pub students: i64,
    pub revenue_cents: i64,
    pub active_email_programs: i64,
    pub pending_video_batches: i64,
}
