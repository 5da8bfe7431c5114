//! # courseforge-api
//!
//! REST API layer for Courseforge. Provides HTTP endpoints for courses,
//! lessons, commerce, email marketing, video batches, community and
//! coaching, plus authentication.

pub mod auth;
pub mod middleware;
pub mod routes;

use axum::Router;
use courseforge_db::Database;
use courseforge_jobs::video::HttpRenderer;
use std::sync::Arc;
use std::time::Instant;

/// Largest request body accepted (video batches carry full scripts).
const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    /// Client for the video render service, shared by spawned batch runs.
    pub renderer: Arc<HttpRenderer>,
    /// Process start, reported by `/health`.
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db: Database, renderer: HttpRenderer) -> Self {
        Self {
            db,
            renderer: Arc::new(renderer),
            started_at: Instant::now(),
        }
    }
}

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .merge(routes::auth::router())
        .merge(routes::users::router())
        .merge(routes::courses::router())
        .merge(routes::lessons::router())
        .merge(routes::commerce::router())
        .merge(routes::webhooks::router())
        .merge(routes::email::router())
        .merge(routes::audience::router())
        .merge(routes::video::router())
        .merge(routes::forums::router())
        .merge(routes::dms::router())
        .merge(routes::coaching::router())
        .merge(routes::analytics::router())
        .merge(routes::health::router());

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .with_state(Arc::new(state))
}
