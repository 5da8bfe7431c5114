//! Direct message routes — 1:1 conversations between any two users.
//!
//! - `GET|POST /dms`
//! - `GET|POST /dms/{conversation_id}/messages`
//! - `POST /dms/{conversation_id}/read`
//!
//! Conversations the caller is not part of read as not found.

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::community::{CreateConversationRequest, DmConversation, DmMessage, SendDmRequest},
    snowflake,
    validation::{page_limit, validate_request},
};
use courseforge_db::repository::{dms, users};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/dms", get(list_conversations).post(open_conversation))
        .route(
            "/dms/{conversation_id}/messages",
            get(list_messages).post(send_message),
        )
        .route("/dms/{conversation_id}/read", post(mark_read))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Debug, Deserialize)]
struct MessageQuery {
    /// Only messages sent before this instant
    before: Option<DateTime<Utc>>,
    limit: Option<i64>,
}

#[derive(Serialize)]
struct ReadReceipt {
    marked: u64,
}

async fn load_conversation(
    state: &AppState,
    auth: &AuthContext,
    conversation_id: Uuid,
) -> ForgeResult<DmConversation> {
    dms::find_conversation(&state.db.pg, conversation_id)
        .await?
        .filter(|c| c.includes(auth.user_id))
        .ok_or_else(|| ForgeError::not_found("Conversation"))
}

/// GET /api/v1/dms — most recently active first.
async fn list_conversations(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<Vec<DmConversation>>> {
    Ok(Json(dms::list_conversations(&state.db.pg, auth.user_id).await?))
}

/// POST /api/v1/dms — open (or reopen) the conversation with `recipient_id`.
async fn open_conversation(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateConversationRequest>,
) -> ForgeResult<Json<DmConversation>> {
    if body.recipient_id == auth.user_id {
        return Err(ForgeError::validation("Cannot message yourself"));
    }

    users::find_by_id(&state.db.pg, body.recipient_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("User"))?;

    let conversation = dms::open_conversation(
        &state.db.pg,
        snowflake::generate_id(),
        auth.user_id,
        body.recipient_id,
    )
    .await?;

    Ok(Json(conversation))
}

/// GET /api/v1/dms/{conversation_id}/messages — newest first.
async fn list_messages(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
) -> ForgeResult<Json<Vec<DmMessage>>> {
    load_conversation(&state, &auth, conversation_id).await?;

    let max = courseforge_common::config::get().limits.max_page_size;
    let limit = page_limit(query.limit, 50, max);

    Ok(Json(
        dms::list_messages(&state.db.pg, conversation_id, query.before, limit).await?,
    ))
}

/// POST /api/v1/dms/{conversation_id}/messages
async fn send_message(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<SendDmRequest>,
) -> ForgeResult<(StatusCode, Json<DmMessage>)> {
    validate_request(&body)?;
    load_conversation(&state, &auth, conversation_id).await?;

    let message = dms::send_message(
        &state.db.pg,
        snowflake::generate_id(),
        conversation_id,
        auth.user_id,
        &body.body,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /api/v1/dms/{conversation_id}/read — mark the other side's messages read.
async fn mark_read(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> ForgeResult<Json<ReadReceipt>> {
    load_conversation(&state, &auth, conversation_id).await?;
    let marked = dms::mark_read(&state.db.pg, conversation_id, auth.user_id).await?;
    Ok(Json(ReadReceipt { marked }))
}
