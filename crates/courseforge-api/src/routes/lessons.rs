//! Lesson routes — course content gated by enrollment and drip schedule.
//!
//! - `GET|POST /courses/{course_id}/lessons`
//! - `GET|PATCH /courses/{course_id}/lessons/{lesson_id}`
//! - `POST /courses/{course_id}/lessons/{lesson_id}/complete`
//!
//! Anyone who can see a course can list its lessons, but only enrolled
//! students (and the course owner) can open them, and only once the
//! lesson's drip policy has unlocked it.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use courseforge_common::{
    drip::DripPolicy,
    error::{ForgeError, ForgeResult},
    models::{
        course::{Course, CreateLessonRequest, Lesson, LessonResponse, UpdateLessonRequest},
        email::AutomationTrigger,
        user::StreakResponse,
    },
    snowflake,
    validation::validate_request,
};
use courseforge_db::repository::{email, entitlements, lessons, progress};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::courses::{load_managed_course, load_visible_course};
use crate::{middleware::AuthContext, AppState};

/// Lesson routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/courses/{course_id}/lessons",
            get(list_lessons).post(create_lesson),
        )
        .route(
            "/courses/{course_id}/lessons/{lesson_id}",
            get(get_lesson).patch(update_lesson),
        )
        .route(
            "/courses/{course_id}/lessons/{lesson_id}/complete",
            post(complete_lesson),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

// ============================================================
// Access
// ============================================================

/// How the caller relates to a course.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Access {
    /// Owner or admin: everything, no drip.
    Manager,
    /// Student with an active entitlement granted at this instant.
    Enrolled(DateTime<Utc>),
    /// Can see the catalogue entry only.
    Visitor,
}

pub(crate) async fn access_for(
    state: &AppState,
    auth: &AuthContext,
    course: &Course,
) -> ForgeResult<Access> {
    if auth.can_manage(course.owner_id) {
        return Ok(Access::Manager);
    }

    Ok(
        match entitlements::find_active(&state.db.pg, auth.user_id, course.id).await? {
            Some(grant) => Access::Enrolled(grant.granted_at),
            None => Access::Visitor,
        },
    )
}

/// List entry: metadata and availability, never content.
fn summarize(
    lesson: &Lesson,
    access: Access,
    completed: bool,
    now: DateTime<Utc>,
) -> ForgeResult<LessonResponse> {
    let drip = lesson.drip_policy()?;
    let availability = match access {
        Access::Enrolled(enrolled_at) => Some(drip.status(enrolled_at, now)),
        Access::Manager | Access::Visitor => None,
    };

    Ok(LessonResponse {
        id: lesson.id,
        course_id: lesson.course_id,
        title: lesson.title.clone(),
        position: lesson.position,
        drip,
        availability,
        body: None,
        video_url: None,
        completed,
    })
}

/// Full lesson, or the reason the caller cannot have it yet.
fn open(
    lesson: &Lesson,
    access: Access,
    completed: bool,
    now: DateTime<Utc>,
) -> ForgeResult<LessonResponse> {
    let mut view = summarize(lesson, access, completed, now)?;

    match (access, view.availability) {
        (Access::Visitor, _) => return Err(ForgeError::MissingEntitlement),
        (Access::Enrolled(_), Some(status)) if !status.unlocked => {
            return Err(ForgeError::Locked {
                unlock_at: status.unlock_at,
            });
        }
        _ => {}
    }

    view.body = lesson.body.clone();
    view.video_url = lesson.video_url.clone();
    Ok(view)
}

async fn completed_ids(state: &AppState, user_id: Uuid, course_id: Uuid) -> ForgeResult<HashSet<Uuid>> {
    Ok(progress::list_for_course(&state.db.pg, user_id, course_id)
        .await?
        .into_iter()
        .map(|p| p.lesson_id)
        .collect())
}

async fn load_lesson(state: &AppState, course_id: Uuid, lesson_id: Uuid) -> ForgeResult<Lesson> {
    lessons::find_by_id(&state.db.pg, course_id, lesson_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Lesson"))
}

// ============================================================
// Handlers
// ============================================================

/// GET /api/v1/courses/{course_id}/lessons
async fn list_lessons(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<Json<Vec<LessonResponse>>> {
    let course = load_visible_course(&state, &auth, course_id).await?;
    let access = access_for(&state, &auth, &course).await?;
    let done = completed_ids(&state, auth.user_id, course_id).await?;
    let now = Utc::now();

    let views = lessons::list_for_course(&state.db.pg, course_id)
        .await?
        .iter()
        .map(|lesson| summarize(lesson, access, done.contains(&lesson.id), now))
        .collect::<ForgeResult<Vec<_>>>()?;

    Ok(Json(views))
}

/// POST /api/v1/courses/{course_id}/lessons
async fn create_lesson(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(body): Json<CreateLessonRequest>,
) -> ForgeResult<(StatusCode, Json<LessonResponse>)> {
    validate_request(&body)?;
    load_managed_course(&state, &auth, course_id).await?;

    let drip = body.drip.unwrap_or(DripPolicy::Immediate);
    drip.check()?;
    let lesson = lessons::create_lesson(
        &state.db.pg,
        snowflake::generate_id(),
        course_id,
        body.title.trim(),
        body.body.as_deref(),
        body.video_url.as_deref(),
        body.position,
        drip.to_columns(),
    )
    .await?;

    tracing::info!(course_id = %course_id, lesson_id = %lesson.id, drip = ?drip, "Lesson created");

    Ok((
        StatusCode::CREATED,
        Json(open(&lesson, Access::Manager, false, Utc::now())?),
    ))
}

/// GET /api/v1/courses/{course_id}/lessons/{lesson_id}
async fn get_lesson(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> ForgeResult<Json<LessonResponse>> {
    let course = load_visible_course(&state, &auth, course_id).await?;
    let lesson = load_lesson(&state, course_id, lesson_id).await?;
    let access = access_for(&state, &auth, &course).await?;
    let done = completed_ids(&state, auth.user_id, course_id).await?;

    Ok(Json(open(&lesson, access, done.contains(&lesson_id), Utc::now())?))
}

/// PATCH /api/v1/courses/{course_id}/lessons/{lesson_id}
async fn update_lesson(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateLessonRequest>,
) -> ForgeResult<Json<LessonResponse>> {
    validate_request(&body)?;
    if let Some(drip) = &body.drip {
        drip.check()?;
    }
    load_managed_course(&state, &auth, course_id).await?;
    load_lesson(&state, course_id, lesson_id).await?;

    let updated = lessons::update_lesson(
        &state.db.pg,
        lesson_id,
        body.title.as_deref().map(str::trim),
        body.body.as_deref(),
        body.video_url.as_deref(),
        body.position,
        body.drip.as_ref().map(DripPolicy::to_columns),
    )
    .await?;

    Ok(Json(open(&updated, Access::Manager, false, Utc::now())?))
}

#[derive(Serialize)]
struct CompletionResponse {
    lesson_id: Uuid,
    /// False when the lesson had already been completed
    newly_completed: bool,
    course_completed: bool,
    streak: StreakResponse,
}

/// POST /api/v1/courses/{course_id}/lessons/{lesson_id}/complete
///
/// Record progress, extend the learner's streak, and fire the course's
/// `lesson_completed` / `course_completed` email automations.
async fn complete_lesson(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, lesson_id)): Path<(Uuid, Uuid)>,
) -> ForgeResult<Json<CompletionResponse>> {
    let course = load_visible_course(&state, &auth, course_id).await?;
    let lesson = load_lesson(&state, course_id, lesson_id).await?;
    let access = access_for(&state, &auth, &course).await?;
    let now = Utc::now();

    // Same gate as opening the lesson
    open(&lesson, access, false, now)?;

    let newly_completed = progress::mark_complete(&state.db.pg, auth.user_id, lesson_id).await?;

    let today = now.date_naive();
    let current = progress::find_streak(&state.db.pg, auth.user_id)
        .await?
        .map(|row| row.state())
        .unwrap_or_default();
    let next = current.record_activity(today);
    if next != current {
        progress::save_streak(&state.db.pg, auth.user_id, next).await?;
    }

    let done = completed_ids(&state, auth.user_id, course_id).await?;
    let total = lessons::count_for_course(&state.db.pg, course_id).await?;
    let course_completed = total > 0 && done.len() as i64 >= total;

    if newly_completed && access != Access::Manager {
        email::enqueue_automations(
            &state.db.pg,
            course_id,
            AutomationTrigger::LessonCompleted,
            auth.user_id,
        )
        .await?;

        if course_completed {
            email::enqueue_automations(
                &state.db.pg,
                course_id,
                AutomationTrigger::CourseCompleted,
                auth.user_id,
            )
            .await?;
            tracing::info!(course_id = %course_id, user_id = %auth.user_id, "Course completed");
        }
    }

    Ok(Json(CompletionResponse {
        lesson_id,
        newly_completed,
        course_completed,
        streak: StreakResponse {
            current_streak: next.effective_current(today),
            longest_streak: next.longest,
            last_activity_date: next.last_activity,
            active: next.is_active(today),
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn lesson(drip: DripPolicy) -> Lesson {
        let (drip_type, drip_days, drip_date) = drip.to_columns();
        let now = utc("2024-03-01T00:00:00Z");
        Lesson {
            id: Uuid::now_v7(),
            course_id: Uuid::now_v7(),
            title: "Week 2: Ownership".into(),
            body: Some("Borrowing rules".into()),
            video_url: Some("https://cdn.example.com/w2.mp4".into()),
            position: 1,
            drip_type: drip_type.to_string(),
            drip_days,
            drip_date,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn summaries_never_include_content() {
        let l = lesson(DripPolicy::Immediate);
        let now = utc("2024-03-02T00:00:00Z");
        for access in [Access::Manager, Access::Enrolled(now), Access::Visitor] {
            let view = summarize(&l, access, false, now).unwrap();
            assert!(view.body.is_none());
            assert!(view.video_url.is_none());
        }
    }

    #[test]
    fn visitors_cannot_open_lessons() {
        let l = lesson(DripPolicy::Immediate);
        let err = open(&l, Access::Visitor, false, Utc::now()).unwrap_err();
        assert!(matches!(err, ForgeError::MissingEntitlement));
    }

    #[test]
    fn enrolled_students_wait_for_the_drip() {
        let l = lesson(DripPolicy::DaysAfterEnrollment { days: 7 });
        let enrolled = utc("2024-03-01T12:00:00Z");

        let err = open(&l, Access::Enrolled(enrolled), false, enrolled + Duration::days(3)).unwrap_err();
        match err {
            ForgeError::Locked { unlock_at } => assert_eq!(unlock_at, utc("2024-03-08T12:00:00Z")),
            other => panic!("expected Locked, got {other:?}"),
        }

        let view = open(&l, Access::Enrolled(enrolled), false, enrolled + Duration::days(7)).unwrap();
        assert_eq!(view.body.as_deref(), Some("Borrowing rules"));
        assert!(view.availability.unwrap().unlocked);
    }

    #[test]
    fn managers_bypass_the_drip() {
        let l = lesson(DripPolicy::FixedDate {
            date: utc("2030-01-01T00:00:00Z"),
        });
        let view = open(&l, Access::Manager, false, utc("2024-03-01T00:00:00Z")).unwrap();
        assert!(view.video_url.is_some());
        assert!(view.availability.is_none());
    }

    #[test]
    fn corrupt_drip_columns_surface_as_errors() {
        let mut l = lesson(DripPolicy::Immediate);
        l.drip_type = "fortnightly".into();
        assert!(summarize(&l, Access::Visitor, false, Utc::now()).is_err());
    }
}
