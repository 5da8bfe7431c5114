//! Authentication routes — register, login, refresh.

use axum::{extract::State, routing::post, Json, Router};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::user::{CreateUserRequest, LoginRequest, User, UserResponse, UserRole},
    snowflake,
    validation::validate_request,
};
use courseforge_db::repository::users;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    auth::{self, TokenPair},
    AppState,
};

/// Auth router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
}

#[derive(Serialize)]
struct AuthResponse {
    user: UserResponse,
    #[serde(flatten)]
    tokens: TokenPair,
}

#[derive(Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

fn issue_tokens(user: &User) -> ForgeResult<TokenPair> {
    let config = courseforge_common::config::get();
    auth::generate_token_pair(
        user.id,
        &user.email,
        user.role,
        &config.auth.jwt_secret,
        config.auth.access_token_ttl_secs,
        config.auth.refresh_token_ttl_secs,
    )
    .map_err(|e| ForgeError::Internal(e.into()))
}

/// POST /api/v1/auth/register
///
/// Create a student (or creator) account. Returns the profile and JWT tokens.
async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> ForgeResult<Json<AuthResponse>> {
    validate_request(&body)?;

    let email = body.email.trim().to_lowercase();
    if users::find_by_email(&state.db.pg, &email).await?.is_some() {
        return Err(ForgeError::AlreadyExists {
            resource: "Email".into(),
        });
    }

    let password_hash = auth::hash_password(&body.password)
        .map_err(|e| ForgeError::Internal(anyhow::anyhow!("{e}")))?;

    let role = if body.creator {
        UserRole::Creator
    } else {
        UserRole::Student
    };

    let user = users::create_user(
        &state.db.pg,
        snowflake::generate_id(),
        &email,
        body.display_name.trim(),
        &password_hash,
        role,
    )
    .await?;

    let tokens = issue_tokens(&user)?;

    tracing::info!(user_id = %user.id, role = ?user.role, "New user registered");

    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> ForgeResult<Json<AuthResponse>> {
    validate_request(&body)?;

    let user = users::find_by_email(&state.db.pg, body.email.trim())
        .await?
        .ok_or(ForgeError::InvalidCredentials)?;

    let valid = auth::verify_password(&body.password, &user.password_hash)
        .map_err(|_| ForgeError::InvalidCredentials)?;
    if !valid {
        return Err(ForgeError::InvalidCredentials);
    }

    let tokens = issue_tokens(&user)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(AuthResponse {
        user: user.into(),
        tokens,
    }))
}

/// POST /api/v1/auth/refresh
///
/// Exchange a refresh token for a new token pair. The role is re-read from
/// the database so promotions take effect on the next refresh.
async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> ForgeResult<Json<TokenPair>> {
    let config = courseforge_common::config::get();

    let claims = auth::validate_token(&body.refresh_token, &config.auth.jwt_secret)
        .map_err(|_| ForgeError::InvalidToken)?;

    if claims.token_type != "refresh" {
        return Err(ForgeError::InvalidToken);
    }

    let user_id: uuid::Uuid = claims.sub.parse().map_err(|_| ForgeError::InvalidToken)?;

    let user = users::find_by_id(&state.db.pg, user_id)
        .await?
        .ok_or(ForgeError::InvalidToken)?;

    Ok(Json(issue_tokens(&user)?))
}
