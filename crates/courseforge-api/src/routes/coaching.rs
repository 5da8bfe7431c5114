//! Coaching slot routes.
//!
//! Creators publish blocks of time; any user (or, for course-restricted
//! slots, enrolled students) can claim one. Booking is first-come: the
//! repository only claims a slot that is still free.

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
    models::coaching::{BookSlotRequest, CoachingSlot, CreateSlotRequest},
    snowflake,
    validation::{page_limit, validate_request},
};
use courseforge_db::repository::{coaching, entitlements};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::courses::load_managed_course;
use crate::{middleware::AuthContext, AppState};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/coaching/slots", get(list_slots).post(create_slot))
        .route(
            "/coaching/slots/{slot_id}/book",
            post(book_slot).delete(cancel_booking),
        )
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

#[derive(Debug, Deserialize)]
struct SlotQuery {
    coach_id: Option<Uuid>,
    /// Only unbooked slots
    #[serde(default)]
    open: bool,
    limit: Option<i64>,
}

/// A slot must end after it starts and must not already have started.
fn check_window(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> ForgeResult<()> {
    if ends_at <= starts_at {
        return Err(ForgeError::validation("Slot must end after it starts"));
    }
    if starts_at <= now {
        return Err(ForgeError::validation("Slot must start in the future"));
    }
    Ok(())
}

fn check_bookable(slot: &CoachingSlot, user_id: Uuid, now: DateTime<Utc>) -> ForgeResult<()> {
    if slot.coach_id == user_id {
        return Err(ForgeError::validation("Cannot book your own slot"));
    }
    if slot.starts_at <= now {
        return Err(ForgeError::validation("Slot has already started"));
    }
    Ok(())
}

/// The claim only returns a row when the slot was still free.
fn claimed(booked: Option<CoachingSlot>) -> ForgeResult<CoachingSlot> {
    booked.ok_or_else(|| ForgeError::Conflict {
        message: "Slot is already booked".into(),
    })
}

/// GET /api/v1/coaching/slots — upcoming slots, soonest first.
async fn list_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotQuery>,
) -> ForgeResult<Json<Vec<CoachingSlot>>> {
    let max = courseforge_common::config::get().limits.max_page_size;
    let limit = page_limit(query.limit, 50, max);

    Ok(Json(
        coaching::list_upcoming(&state.db.pg, query.coach_id, query.open, Utc::now(), limit).await?,
    ))
}

/// POST /api/v1/coaching/slots
async fn create_slot(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSlotRequest>,
) -> ForgeResult<(StatusCode, Json<CoachingSlot>)> {
    auth.require_creator()?;
    validate_request(&body)?;
    check_window(body.starts_at, body.ends_at, Utc::now())?;

    if let Some(course_id) = body.course_id {
        load_managed_course(&state, &auth, course_id).await?;
    }

    if coaching::overlaps(&state.db.pg, auth.user_id, body.starts_at, body.ends_at).await? {
        return Err(ForgeError::Conflict {
            message: "Slot overlaps an existing slot".into(),
        });
    }

    let slot = coaching::create_slot(
        &state.db.pg,
        snowflake::generate_id(),
        auth.user_id,
        body.course_id,
        body.starts_at,
        body.ends_at,
    )
    .await?;

    tracing::info!(slot_id = %slot.id, coach_id = %slot.coach_id, starts_at = %slot.starts_at, "Coaching slot created");

    Ok((StatusCode::CREATED, Json(slot)))
}

/// POST /api/v1/coaching/slots/{slot_id}/book
async fn book_slot(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
    Json(body): Json<BookSlotRequest>,
) -> ForgeResult<Json<CoachingSlot>> {
    validate_request(&body)?;

    let slot = coaching::find_slot(&state.db.pg, slot_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Coaching slot"))?;

    check_bookable(&slot, auth.user_id, Utc::now())?;
    if let Some(course_id) = slot.course_id {
        if entitlements::find_active(&state.db.pg, auth.user_id, course_id)
            .await?
            .is_none()
        {
            return Err(ForgeError::MissingEntitlement);
        }
    }

    let booked = claimed(coaching::book_slot(&state.db.pg, slot_id, auth.user_id, body.note.as_deref()).await?)?;

    tracing::info!(slot_id = %slot_id, booked_by = %auth.user_id, "Coaching slot booked");

    Ok(Json(booked))
}

/// DELETE /api/v1/coaching/slots/{slot_id}/book
async fn cancel_booking(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
) -> ForgeResult<Json<CoachingSlot>> {
    let slot = coaching::cancel_booking(&state.db.pg, slot_id, auth.user_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Booking"))?;

    tracing::info!(slot_id = %slot_id, user_id = %auth.user_id, "Coaching booking cancelled");

    Ok(Json(slot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn window_must_be_ordered_and_in_the_future() {
        let now = Utc::now();
        let start = now + Duration::hours(1);

        assert!(check_window(start, start + Duration::minutes(30), now).is_ok());
        assert!(check_window(start, start, now).is_err());
        assert!(check_window(start, start - Duration::minutes(1), now).is_err());
        assert!(check_window(now - Duration::minutes(5), now + Duration::minutes(25), now).is_err());
    }

    fn slot(coach_id: Uuid, starts_at: DateTime<Utc>) -> CoachingSlot {
        CoachingSlot {
            id: Uuid::now_v7(),
            coach_id,
            course_id: None,
            starts_at,
            ends_at: starts_at + Duration::minutes(30),
            booked_by: None,
            booked_at: None,
            note: None,
            created_at: starts_at - Duration::days(1),
        }
    }

    #[test]
    fn second_claim_on_a_slot_is_a_conflict() {
        let open = slot(Uuid::now_v7(), Utc::now() + Duration::hours(2));
        let first = claimed(Some(open.clone())).unwrap();
        assert_eq!(first.id, open.id);

        let err = claimed(None).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Conflict: Slot is already booked");
    }

    #[test]
    fn coaches_cannot_book_themselves_or_started_slots() {
        let now = Utc::now();
        let coach = Uuid::now_v7();
        let student = Uuid::now_v7();

        assert!(check_bookable(&slot(coach, now + Duration::hours(1)), student, now).is_ok());
        let own = check_bookable(&slot(coach, now + Duration::hours(1)), coach, now).unwrap_err();
        assert_eq!(own.status_code(), StatusCode::BAD_REQUEST);
        assert!(check_bookable(&slot(coach, now - Duration::minutes(1)), student, now).is_err());
    }
}
