//! Creator dashboard numbers.

use axum::{
    extract::{Extension, Path, State},
    middleware,
    routing::get,
    Json, Router,
};
use courseforge_common::{
    error::ForgeResult,
    models::analytics::{CourseAnalytics, CreatorOverview},
};
use courseforge_db::repository::analytics;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::courses::load_managed_course;
use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/courses/{course_id}/analytics", get(course_analytics))
        .route("/analytics/overview", get(overview))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Serialize)]
struct CourseAnalyticsResponse {
    #[serde(flatten)]
    stats: CourseAnalytics,
    completion_rate: f64,
}

/// GET /api/v1/courses/{course_id}/analytics
async fn course_analytics(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(course_id): Path<Uuid>,
) -> ForgeResult<Json<CourseAnalyticsResponse>> {
    load_managed_course(&state, &auth, course_id).await?;
    let stats = analytics::course_analytics(&state.db.pg, course_id).await?;
    let completion_rate = stats.completion_rate();
    Ok(Json(CourseAnalyticsResponse { stats, completion_rate }))
}

/// GET /api/v1/analytics/overview
async fn overview(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<CreatorOverview>> {
    auth.require_creator()?;
    Ok(Json(analytics::creator_overview(&state.db.pg, auth.user_id).await?))
}
