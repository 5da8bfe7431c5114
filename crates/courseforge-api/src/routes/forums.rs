//! Course forum routes.
//!
//! Forums are private to a course: the owner and enrolled students can read
//! and post, everyone else gets `NOT_ENROLLED`. Only the course owner (or an
//! admin) can moderate threads.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Json, Router,
};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::{
        community::{CreatePostRequest, CreateThreadRequest, ForumPost, ForumThread, UpdateThreadRequest},
        course::Course,
    },
    snowflake,
    validation::validate_request,
};
use courseforge_db::repository::forums;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    courses::load_visible_course,
    lessons::{access_for, Access},
    Pagination,
};
use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/courses/{course_id}/threads",
            get(list_threads).post(create_thread),
        )
        .route(
            "/courses/{course_id}/threads/{thread_id}",
            get(get_thread).patch(update_thread),
        )
        .route(
            "/courses/{course_id}/threads/{thread_id}/posts",
            get(list_posts).post(create_post),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Serialize)]
struct ThreadCreated {
    #[serde(flatten)]
    thread: ForumThread,
    first_post: ForumPost,
}

/// Load the course and check the caller may take part in its forum.
async fn forum_member(
    state: &AppState,
    auth: &AuthContext,
    course_id: Uuid,
) -> ForgeResult<(Course, Access)> {
    let course = load_visible_course(state, auth, course_id).await?;
    let access = access_for(state, auth, &course).await?;
    if access == Access::Visitor {
        return Err(ForgeError::MissingEntitlement);
    }
    Ok((course, access))
}

async fn load_thread(state: &AppState, course_id: Uuid, thread_id: Uuid) -> ForgeResult<ForumThread> {
    forums::find_thread(&state.db.pg, course_id, thread_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Thread"))
}

fn check_post_length(body: &str) -> ForgeResult<()> {
    let max = courseforge_common::config::get().limits.max_post_length;
    if body.chars().count() > max {
        return Err(ForgeError::validation(format!(
            "Post body must be at most {max} characters"
        )));
    }
    Ok(())
}

// ============================================================
// Threads
// ============================================================

/// GET /api/v1/courses/{course_id}/threads — pinned first, then most recent activity.
async fn list_threads(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Query(page): Query<Pagination>,
) -> ForgeResult<Json<Vec<ForumThread>>> {
    forum_member(&state, &auth, course_id).await?;
    let (limit, offset) = page.resolve(25);
    Ok(Json(forums::list_threads(&state.db.pg, course_id, limit, offset).await?))
}

/// POST /api/v1/courses/{course_id}/threads
async fn create_thread(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
    Json(body): Json<CreateThreadRequest>,
) -> ForgeResult<(StatusCode, Json<ThreadCreated>)> {
    validate_request(&body)?;
    check_post_length(&body.body)?;
    forum_member(&state, &auth, course_id).await?;

    let (thread, first_post) = forums::create_thread(
        &state.db.pg,
        snowflake::generate_id(),
        snowflake::generate_id(),
        course_id,
        auth.user_id,
        body.title.trim(),
        &body.body,
    )
    .await?;

    tracing::info!(thread_id = %thread.id, course_id = %course_id, author = %auth.user_id, "Thread created");

    Ok((StatusCode::CREATED, Json(ThreadCreated { thread, first_post })))
}

/// GET /api/v1/courses/{course_id}/threads/{thread_id}
async fn get_thread(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, thread_id)): Path<(Uuid, Uuid)>,
) -> ForgeResult<Json<ForumThread>> {
    forum_member(&state, &auth, course_id).await?;
    Ok(Json(load_thread(&state, course_id, thread_id).await?))
}

/// PATCH /api/v1/courses/{course_id}/threads/{thread_id} — rename, lock, pin.
async fn update_thread(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, thread_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateThreadRequest>,
) -> ForgeResult<Json<ForumThread>> {
    validate_request(&body)?;
    let (_, access) = forum_member(&state, &auth, course_id).await?;
    if access != Access::Manager {
        return Err(ForgeError::Forbidden);
    }
    load_thread(&state, course_id, thread_id).await?;

    let updated = forums::update_thread(
        &state.db.pg,
        thread_id,
        body.title.as_deref().map(str::trim),
        body.locked,
        body.pinned,
    )
    .await?;

    tracing::info!(
        thread_id = %thread_id,
        locked = updated.locked,
        pinned = updated.pinned,
        "Thread moderated"
    );

    Ok(Json(updated))
}

// ============================================================
// Posts
// ============================================================

/// GET /api/v1/courses/{course_id}/threads/{thread_id}/posts — oldest first.
async fn list_posts(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, thread_id)): Path<(Uuid, Uuid)>,
    Query(page): Query<Pagination>,
) -> ForgeResult<Json<Vec<ForumPost>>> {
    forum_member(&state, &auth, course_id).await?;
    load_thread(&state, course_id, thread_id).await?;
    let (limit, offset) = page.resolve(50);
    Ok(Json(forums::list_posts(&state.db.pg, thread_id, limit, offset).await?))
}

/// POST /api/v1/courses/{course_id}/threads/{thread_id}/posts
///
/// Locked threads only accept replies from moderators.
async fn create_post(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path((course_id, thread_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<CreatePostRequest>,
) -> ForgeResult<(StatusCode, Json<ForumPost>)> {
    validate_request(&body)?;
    check_post_length(&body.body)?;
    let (_, access) = forum_member(&state, &auth, course_id).await?;

    let thread = load_thread(&state, course_id, thread_id).await?;
    if thread.locked && access != Access::Manager {
        return Err(ForgeError::Conflict {
            message: "Thread is locked".into(),
        });
    }

    let post = forums::create_post(
        &state.db.pg,
        snowflake::generate_id(),
        thread_id,
        auth.user_id,
        &body.body,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(post)))
}
