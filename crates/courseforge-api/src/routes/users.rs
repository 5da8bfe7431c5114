//! User routes — profile, presence heartbeat, learning streak.

use axum::{
    extract::{Extension, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::user::{StreakResponse, UserResponse},
};
use courseforge_db::repository::{progress, users};
use std::sync::Arc;

use crate::{middleware::AuthContext, AppState};

/// User routes (all require authentication).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/@me", get(get_current_user))
        .route("/users/@me/heartbeat", post(heartbeat))
        .route("/users/@me/streak", get(get_streak))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

/// GET /api/v1/users/@me — Get the authenticated user's profile.
async fn get_current_user(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<UserResponse>> {
    let user = users::find_by_id(&state.db.pg, auth.user_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("User"))?;

    Ok(Json(user.into()))
}

/// POST /api/v1/users/@me/heartbeat — Clients poll this to mark the user online.
async fn heartbeat(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<StatusCode> {
    users::touch_last_seen(&state.db.pg, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/users/@me/streak
async fn get_streak(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<StreakResponse>> {
    let today = Utc::now().date_naive();
    let state = progress::find_streak(&state.db.pg, auth.user_id)
        .await?
        .map(|row| row.state())
        .unwrap_or_default();

    Ok(Json(StreakResponse {
        current_streak: state.effective_current(today),
        longest_streak: state.longest,
        last_activity_date: state.last_activity,
        active: state.is_active(today),
    }))
}
