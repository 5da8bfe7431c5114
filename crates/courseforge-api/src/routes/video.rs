//! Video batch routes.
//!
//! - `GET|POST /video-batches`
//! - `GET /video-batches/{job_id}` — job plus per-item status
//! - `POST /video-batches/{job_id}/process` — start (or resume) rendering
//!
//! Processing runs on a background task and the request returns `202`
//! immediately; clients poll the job for progress.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::video::{
        BatchStatus, CreateVideoBatchRequest, VideoBatchJob, VideoBatchResponse,
    },
    snowflake,
    validation::validate_request,
};
use courseforge_db::repository::video_jobs;
use courseforge_jobs::video::spawn_batch;
use std::sync::Arc;
use uuid::Uuid;

use super::{courses::load_managed_course, Pagination};
use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/video-batches", get(list_batches).post(create_batch))
        .route("/video-batches/{job_id}", get(get_batch))
        .route("/video-batches/{job_id}/process", post(process_batch))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

async fn load_owned_job(
    state: &AppState,
    auth: &AuthContext,
    job_id: Uuid,
) -> ForgeResult<VideoBatchJob> {
    let job = video_jobs::find_job(&state.db.pg, job_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Video batch"))?;

    if !auth.can_manage(job.owner_id) {
        return Err(ForgeError::not_found("Video batch"));
    }
    Ok(job)
}

/// GET /api/v1/video-batches
async fn list_batches(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> ForgeResult<Json<Vec<VideoBatchJob>>> {
    auth.require_creator()?;
    let (limit, _) = page.resolve(50);
    Ok(Json(video_jobs::list_jobs(&state.db.pg, auth.user_id, limit).await?))
}

/// POST /api/v1/video-batches — Queue a batch. Nothing renders until `/process`.
async fn create_batch(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateVideoBatchRequest>,
) -> ForgeResult<(StatusCode, Json<VideoBatchResponse>)> {
    auth.require_creator()?;
    validate_request(&body)?;

    let max_items = courseforge_common::config::get().limits.max_batch_items;
    if body.briefs.len() > max_items {
        return Err(ForgeError::validation(format!(
            "A batch can hold at most {max_items} briefs"
        )));
    }

    if let Some(course_id) = body.course_id {
        load_managed_course(&state, &auth, course_id).await?;
    }

    let job = video_jobs::create_job(
        &state.db.pg,
        snowflake::generate_id(),
        auth.user_id,
        body.course_id,
        &body.briefs,
    )
    .await?;
    let items = video_jobs::list_items(&state.db.pg, job.id).await?;

    tracing::info!(job_id = %job.id, items = items.len(), "Video batch created");

    Ok((StatusCode::CREATED, Json(VideoBatchResponse { job, items })))
}

/// GET /api/v1/video-batches/{job_id}
async fn get_batch(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> ForgeResult<Json<VideoBatchResponse>> {
    let job = load_owned_job(&state, &auth, job_id).await?;
    let items = video_jobs::list_items(&state.db.pg, job_id).await?;
    Ok(Json(VideoBatchResponse { job, items }))
}

/// POST /api/v1/video-batches/{job_id}/process
///
/// Pending and failed batches start rendering; complete batches are left
/// alone; a batch already processing is a conflict.
async fn process_batch(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<Uuid>,
) -> ForgeResult<(StatusCode, Json<VideoBatchJob>)> {
    let job = load_owned_job(&state, &auth, job_id).await?;

    match job.status {
        BatchStatus::Complete => return Ok((StatusCode::OK, Json(job))),
        BatchStatus::Processing => {
            return Err(ForgeError::Conflict {
                message: "Video batch is already processing".into(),
            });
        }
        BatchStatus::Pending | BatchStatus::Failed => {}
    }

    spawn_batch(state.db.clone(), state.renderer.clone(), job_id);
    tracing::info!(job_id = %job_id, by = %auth.user_id, "Video batch processing requested");

    Ok((StatusCode::ACCEPTED, Json(job)))
}
