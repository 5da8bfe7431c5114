//! Course routes — catalogue, creation, and management.
//!
//! - `GET /courses` lists the published catalogue (`?search=`), or the
//!   caller's own courses with `?mine=true`
//! - `POST /courses` creates a draft (creators only)
//! - `GET|PATCH|DELETE /courses/{course_id}`

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::course::{Course, CreateCourseRequest, UpdateCourseRequest},
    snowflake,
    validation::{validate_currency, validate_request, validate_slug},
};
use courseforge_db::repository::courses;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::Pagination;
use crate::{middleware::AuthContext, AppState};

/// Course routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses", get(list_courses).post(create_course))
        .route(
            "/courses/{course_id}",
            get(get_course).patch(update_course).delete(delete_course),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

// ============================================================
// Shared lookups
// ============================================================

/// Load a course the caller may see. Drafts are invisible to everyone but
/// their owner and admins.
pub(crate) async fn load_visible_course(
    state: &AppState,
    auth: &AuthContext,
    course_id: Uuid,
) -> ForgeResult<Course> {
    let course = courses::find_by_id(&state.db.pg, course_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Course"))?;

    if course.published || auth.can_manage(course.owner_id) {
        Ok(course)
    } else {
        Err(ForgeError::not_found("Course"))
    }
}

/// Load a course the caller owns (or administers).
pub(crate) async fn load_managed_course(
    state: &AppState,
    auth: &AuthContext,
    course_id: Uuid,
) -> ForgeResult<Course> {
    let course = courses::find_by_id(&state.db.pg, course_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Course"))?;

    if !auth.can_manage(course.owner_id) {
        return Err(ForgeError::Forbidden);
    }
    Ok(course)
}

// ============================================================
// Handlers
// ============================================================

#[derive(Debug, Deserialize)]
struct CourseQuery {
    search: Option<String>,
    #[serde(default)]
    mine: bool,
    limit: Option<i64>,
    offset: Option<i64>,
}

/// GET /api/v1/courses
async fn list_courses(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<CourseQuery>,
) -> ForgeResult<Json<Vec<Course>>> {
    if query.mine {
        return Ok(Json(courses::list_by_owner(&state.db.pg, auth.user_id).await?));
    }

    let (limit, offset) = Pagination {
        limit: query.limit,
        offset: query.offset,
    }
    .resolve(50);

    let search = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    Ok(Json(
        courses::list_published(&state.db.pg, search, limit, offset).await?,
    ))
}

/// POST /api/v1/courses — Create an unpublished course.
async fn create_course(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateCourseRequest>,
) -> ForgeResult<(StatusCode, Json<Course>)> {
    auth.require_creator()?;
    validate_request(&body)?;
    validate_slug(&body.slug)?;

    let currency = body.currency.as_deref().unwrap_or("usd").to_lowercase();
    validate_currency(&currency)?;

    if courses::find_by_slug(&state.db.pg, &body.slug).await?.is_some() {
        return Err(ForgeError::AlreadyExists {
            resource: "Slug".into(),
        });
    }

    let course = courses::create_course(
        &state.db.pg,
        snowflake::generate_id(),
        auth.user_id,
        body.title.trim(),
        &body.slug,
        body.description.as_deref(),
        body.price_cents,
        &currency,
    )
    .await?;

    tracing::info!(course_id = %course.id, owner = %auth.user_id, slug = %course.slug, "Course created");

    Ok((StatusCode::CREATED, Json(course)))
}

/// GET /api/v1/courses/{course_id}
async fn get_course(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<Json<Course>> {
    Ok(Json(load_visible_course(&state, &auth, course_id).await?))
}

/// PATCH /api/v1/courses/{course_id}
async fn update_course(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(body): Json<UpdateCourseRequest>,
) -> ForgeResult<Json<Course>> {
    validate_request(&body)?;
    load_managed_course(&state, &auth, course_id).await?;

    let updated = courses::update_course(
        &state.db.pg,
        course_id,
        body.title.as_deref().map(str::trim),
        body.description.as_deref(),
        body.price_cents,
        body.published,
    )
    .await?;

    if body.published == Some(true) {
        tracing::info!(course_id = %course_id, "Course published");
    }

    Ok(Json(updated))
}

/// DELETE /api/v1/courses/{course_id}
async fn delete_course(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<StatusCode> {
    load_managed_course(&state, &auth, course_id).await?;

    if !courses::delete_course(&state.db.pg, course_id).await? {
        return Err(ForgeError::not_found("Course"));
    }

    tracing::info!(course_id = %course_id, by = %auth.user_id, "Course deleted");
    Ok(StatusCode::NO_CONTENT)
}
