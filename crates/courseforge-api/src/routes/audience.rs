//! Audience sync — hashed student identifiers for ad-platform custom audiences.
//!
//! `GET /courses/{course_id}/audience` returns SHA-256 digests of the
//! normalized emails of everyone enrolled, already split into upload-sized
//! batches. Raw emails never leave this endpoint.

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use courseforge_common::{audience::hash_audience, error::ForgeResult};
use courseforge_db::repository::users;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::courses::load_managed_course;
use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses/{course_id}/audience", get(get_audience))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Serialize)]
struct AudienceExport {
    course_id: Uuid,
    /// Distinct hashed identifiers across all batches
    total: usize,
    batch_size: usize,
    batches: Vec<Vec<String>>,
}

/// GET /api/v1/courses/{course_id}/audience
async fn get_audience(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<Json<AudienceExport>> {
    let course = load_managed_course(&state, &auth, course_id).await?;
    let batch_size = courseforge_common::config::get().audience.batch_size;

    let members = users::audience_emails(&state.db.pg, course.owner_id, Some(course_id)).await?;
    let batches = hash_audience(members.iter().map(|(_, email)| email.as_str()), batch_size);
    let total = batches.iter().map(Vec::len).sum();

    tracing::info!(course_id = %course_id, total, batches = batches.len(), "Audience exported");

    Ok(Json(AudienceExport {
        course_id,
        total,
        batch_size,
        batches,
    }))
}
