//! Email marketing routes.
//!
//! - `GET|POST /email/programs`, `GET|PATCH|DELETE /email/programs/{program_id}`
//! - `POST /email/schedule/preview` — plain-English schedule to cron + next runs
//! - `GET|POST /email/automations`, `DELETE /email/automations/{automation_id}`
//!
//! Programs store both the creator's schedule text and the derived cron; the
//! dispatcher in `courseforge-jobs` only ever reads the cron.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use courseforge_common::{
    error::{ForgeError, ForgeResult},
    models::email::{
        CreateAutomationRequest, CreateEmailProgramRequest, EmailAutomation, EmailProgram,
        SchedulePreviewRequest, UpdateEmailProgramRequest,
    },
    schedule::{self, SchedulePreview},
    snowflake,
    validation::validate_request,
};
use courseforge_db::repository::email::{self, NewProgram, ProgramChanges};
use std::sync::Arc;
use uuid::Uuid;

use super::courses::load_managed_course;
use crate::{middleware::AuthContext, AppState};

/// Email routes (creators only).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/email/programs", get(list_programs).post(create_program))
        .route(
            "/email/programs/{program_id}",
            get(get_program).patch(update_program).delete(delete_program),
        )
        .route("/email/schedule/preview", post(preview_schedule))
        .route(
            "/email/automations",
            get(list_automations).post(create_automation),
        )
        .route("/email/automations/{automation_id}", delete(delete_automation))
        .route_layer(middleware::from_fn(crate::middleware::auth_middleware))
}

/// Fire times shown in a preview when the client does not ask for a count.
const DEFAULT_PREVIEW_COUNT: usize = 5;

async fn load_owned_program(
    state: &AppState,
    auth: &AuthContext,
    program_id: Uuid,
) -> ForgeResult<EmailProgram> {
    let program = email::find_program(&state.db.pg, program_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Email program"))?;

    if !auth.can_manage(program.owner_id) {
        // Don't reveal other creators' programs
        return Err(ForgeError::not_found("Email program"));
    }
    Ok(program)
}

// ============================================================
// Programs
// ============================================================

/// GET /api/v1/email/programs
async fn list_programs(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<Vec<EmailProgram>>> {
    auth.require_creator()?;
    Ok(Json(email::list_programs(&state.db.pg, auth.user_id).await?))
}

/// POST /api/v1/email/programs
async fn create_program(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateEmailProgramRequest>,
) -> ForgeResult<(StatusCode, Json<EmailProgram>)> {
    auth.require_creator()?;
    validate_request(&body)?;

    if let Some(course_id) = body.course_id {
        load_managed_course(&state, &auth, course_id).await?;
    }

    let config = courseforge_common::config::get();
    let timezone = body
        .timezone
        .as_deref()
        .unwrap_or(&config.email.default_timezone);

    let parsed = schedule::parse_schedule(&body.schedule)?;
    let tz = schedule::parse_timezone(timezone)?;
    let cron = parsed.to_cron();
    let next_run_at = parsed.next_run(Utc::now(), tz);

    let program = email::create_program(
        &state.db.pg,
        NewProgram {
            id: snowflake::generate_id(),
            owner_id: auth.user_id,
            course_id: body.course_id,
            name: body.name.trim(),
            subject: &body.subject,
            body: &body.body,
            schedule_text: body.schedule.trim(),
            cron: &cron,
            timezone: tz.name(),
            next_run_at,
        },
    )
    .await?;

    tracing::info!(
        program_id = %program.id,
        cron = %program.cron,
        timezone = %program.timezone,
        next_run_at = ?program.next_run_at,
        "Email program created"
    );

    Ok((StatusCode::CREATED, Json(program)))
}

/// GET /api/v1/email/programs/{program_id}
async fn get_program(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<Uuid>,
) -> ForgeResult<Json<EmailProgram>> {
    Ok(Json(load_owned_program(&state, &auth, program_id).await?))
}

/// PATCH /api/v1/email/programs/{program_id}
///
/// Changing the schedule or timezone re-derives the cron and next run.
/// Reactivating a program also schedules it from now.
async fn update_program(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<Uuid>,
    Json(body): Json<UpdateEmailProgramRequest>,
) -> ForgeResult<Json<EmailProgram>> {
    validate_request(&body)?;
    let existing = load_owned_program(&state, &auth, program_id).await?;

    let schedule_text = body.schedule.as_deref().unwrap_or(&existing.schedule_text);
    let timezone = body.timezone.as_deref().unwrap_or(&existing.timezone);
    let reschedule =
        body.schedule.is_some() || body.timezone.is_some() || body.active == Some(true);

    let rescheduled = if reschedule {
        let parsed = schedule::parse_schedule(schedule_text)?;
        let tz = schedule::parse_timezone(timezone)?;
        Some((parsed.to_cron(), tz.name(), parsed.next_run(Utc::now(), tz)))
    } else {
        None
    };

    let mut changes = ProgramChanges {
        name: body.name.as_deref().map(str::trim),
        subject: body.subject.as_deref(),
        body: body.body.as_deref(),
        active: body.active,
        ..Default::default()
    };
    if let Some((cron, tz_name, next_run_at)) = &rescheduled {
        changes.schedule_text = Some(schedule_text.trim());
        changes.cron = Some(cron.as_str());
        changes.timezone = Some(*tz_name);
        changes.next_run_at = *next_run_at;
    }

    let updated = email::update_program(&state.db.pg, program_id, changes).await?;
    Ok(Json(updated))
}

/// DELETE /api/v1/email/programs/{program_id}
async fn delete_program(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(program_id): Path<Uuid>,
) -> ForgeResult<StatusCode> {
    load_owned_program(&state, &auth, program_id).await?;
    email::delete_program(&state.db.pg, program_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/email/schedule/preview
///
/// Lets the composer show upcoming sends before saving.
async fn preview_schedule(
    Extension(auth): Extension<AuthContext>,
    Json(body): Json<SchedulePreviewRequest>,
) -> ForgeResult<Json<SchedulePreview>> {
    auth.require_creator()?;
    validate_request(&body)?;

    let config = courseforge_common::config::get();
    let timezone = body
        .timezone
        .as_deref()
        .unwrap_or(&config.email.default_timezone);

    Ok(Json(schedule::preview(
        &body.schedule,
        timezone,
        Utc::now(),
        body.count.unwrap_or(DEFAULT_PREVIEW_COUNT),
    )?))
}

// ============================================================
// Automations
// ============================================================

/// GET /api/v1/email/automations
async fn list_automations(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
) -> ForgeResult<Json<Vec<EmailAutomation>>> {
    auth.require_creator()?;
    Ok(Json(email::list_automations(&state.db.pg, auth.user_id).await?))
}

/// POST /api/v1/email/automations
async fn create_automation(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAutomationRequest>,
) -> ForgeResult<(StatusCode, Json<EmailAutomation>)> {
    auth.require_creator()?;
    validate_request(&body)?;
    load_managed_course(&state, &auth, body.course_id).await?;

    let automation = email::create_automation(
        &state.db.pg,
        snowflake::generate_id(),
        auth.user_id,
        body.course_id,
        body.trigger,
        body.delay_minutes,
        &body.subject,
        &body.body,
    )
    .await?;

    tracing::info!(
        automation_id = %automation.id,
        course_id = %automation.course_id,
        trigger = ?automation.trigger,
        "Email automation created"
    );

    Ok((StatusCode::CREATED, Json(automation)))
}

/// DELETE /api/v1/email/automations/{automation_id}
async fn delete_automation(
    Extension(auth): Extension<AuthContext>,
    State(state): State<Arc<AppState>>,
    Path(automation_id): Path<Uuid>,
) -> ForgeResult<StatusCode> {
    let automation = email::find_automation(&state.db.pg, automation_id)
        .await?
        .ok_or_else(|| ForgeError::not_found("Email automation"))?;

    if !auth.can_manage(automation.owner_id) {
        return Err(ForgeError::not_found("Email automation"));
    }

    email::delete_automation(&state.db.pg, automation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
