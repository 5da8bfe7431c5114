//! Email programs, automations, and the send queue.

use chrono::{DateTime, Utc};
use courseforge_common::models::email::{AutomationTrigger, EmailAutomation, EmailProgram};
use sqlx::PgPool;
use uuid::Uuid;

// ============================================================
// Programs
// ============================================================

/// Columns supplied when creating a program.
#[derive(Debug, Clone)]
pub struct NewProgram<'a> {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub course_id: Option<Uuid>,
    pub name: &'a str,
    pub subject: &'a str,
    pub body: &'a str,
    pub schedule_text: &'a str,
    pub cron: &'a str,
    pub timezone: &'a str,
    pub next_run_at: Option<DateTime<Utc>>,
}

pub async fn create_program(pool: &PgPool, p: NewProgram<'_>) -> Result<EmailProgram, sqlx::Error> {
    sqlx::query_as::<_, EmailProgram>(
        r#"
        INSERT INTO email_programs (id, owner_id, course_id, name, subject, body,
                                    schedule_text, cron, timezone, active, next_run_at,
                                    created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, true, $10, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(p.id)
    .bind(p.owner_id)
    .bind(p.course_id)
    .bind(p.name)
    .bind(p.subject)
    .bind(p.body)
    .bind(p.schedule_text)
    .bind(p.cron)
    .bind(p.timezone)
    .bind(p.next_run_at)
    .fetch_one(pool)
    .await
}

pub async fn find_program(pool: &PgPool, id: Uuid) -> Result<Option<EmailProgram>, sqlx::Error> {
    sqlx::query_as::<_, EmailProgram>("SELECT * FROM email_programs WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_programs(pool: &PgPool, owner_id: Uuid) -> Result<Vec<EmailProgram>, sqlx::Error> {
    sqlx::query_as::<_, EmailProgram>(
        "SELECT * FROM email_programs WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

/// Columns that may change on update. Schedule fields move together.
#[derive(Debug, Clone, Default)]
pub struct ProgramChanges<'a> {
    pub name: Option<&'a str>,
    pub subject: Option<&'a str>,
    pub body: Option<&'a str>,
    pub schedule_text: Option<&'a str>,
    pub cron: Option<&'a str>,
    pub timezone: Option<&'a str>,
    pub active: Option<bool>,
    pub next_run_at: Option<DateTime<Utc>>,
}

pub async fn update_program(
    pool: &PgPool,
    id: Uuid,
    c: ProgramChanges<'_>,
) -> Result<EmailProgram, sqlx::Error> {
    sqlx::query_as::<_, EmailProgram>(
        r#"
        UPDATE email_programs SET
            name = COALESCE($2, name),
            subject = COALESCE($3, subject),
            body = COALESCE($4, body),
            schedule_text = COALESCE($5, schedule_text),
            cron = COALESCE($6, cron),
            timezone = COALESCE($7, timezone),
            active = COALESCE($8, active),
            next_run_at = COALESCE($9, next_run_at),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(c.name)
    .bind(c.subject)
    .bind(c.body)
    .bind(c.schedule_text)
    .bind(c.cron)
    .bind(c.timezone)
    .bind(c.active)
    .bind(c.next_run_at)
    .fetch_one(pool)
    .await
}

pub async fn delete_program(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM email_programs WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Active programs whose next run is at or before `now`.
pub async fn due_programs(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<EmailProgram>, sqlx::Error> {
    sqlx::query_as::<_, EmailProgram>(
        r#"
        SELECT * FROM email_programs
        WHERE active = true AND next_run_at IS NOT NULL AND next_run_at <= $1
        ORDER BY next_run_at
        LIMIT $2
        "#,
    )
    .bind(now)
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Record a run and move the program to its next fire time.
/// `next_run_at = None` deactivates the program.
pub async fn advance_program(
    pool: &PgPool,
    id: Uuid,
    ran_at: DateTime<Utc>,
    next_run_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE email_programs SET
            last_run_at = $2,
            next_run_at = $3,
            active = active AND $3 IS NOT NULL,
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(ran_at)
    .bind(next_run_at)
    .execute(pool)
    .await?;
    Ok(())
}

// ============================================================
// Automations
// ============================================================

#[allow(clippy::too_many_arguments)]
pub async fn create_automation(
    pool: &PgPool,
    id: Uuid,
    owner_id: Uuid,
    course_id: Uuid,
    trigger: AutomationTrigger,
    delay_minutes: i32,
    subject: &str,
    body: &str,
) -> Result<EmailAutomation, sqlx::Error> {
    sqlx::query_as::<_, EmailAutomation>(
        r#"
        INSERT INTO email_automations (id, owner_id, course_id, trigger, delay_minutes,
                                       subject, body, active, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, true, NOW())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(course_id)
    .bind(trigger)
    .bind(delay_minutes)
    .bind(subject)
    .bind(body)
    .fetch_one(pool)
    .await
}

pub async fn list_automations(pool: &PgPool, owner_id: Uuid) -> Result<Vec<EmailAutomation>, sqlx::Error> {
    sqlx::query_as::<_, EmailAutomation>(
        "SELECT * FROM email_automations WHERE owner_id = $1 ORDER BY created_at DESC",
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn find_automation(pool: &PgPool, id: Uuid) -> Result<Option<EmailAutomation>, sqlx::Error> {
    sqlx::query_as::<_, EmailAutomation>("SELECT * FROM email_automations WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn delete_automation(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM email_automations WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Queue every active automation for `trigger` on `course_id` for one user.
/// Returns the number of sends queued.
pub async fn enqueue_automations(
    pool: &PgPool,
    course_id: Uuid,
    trigger: AutomationTrigger,
    user_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO email_sends (id, automation_id, user_id, status, scheduled_for, created_at)
        SELECT gen_random_uuid(), a.id, $3, 'queued',
               NOW() + make_interval(mins => a.delay_minutes), NOW()
        FROM email_automations a
        WHERE a.course_id = $1 AND a.trigger = $2 AND a.active = true
        "#,
    )
    .bind(course_id)
    .bind(trigger)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

// ============================================================
// Send queue
// ============================================================

/// Queue one program run for a list of recipients.
pub async fn enqueue_program_sends(
    pool: &PgPool,
    program_id: Uuid,
    user_ids: &[Uuid],
    scheduled_for: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if user_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        r#"
        INSERT INTO email_sends (id, program_id, user_id, status, scheduled_for, created_at)
        SELECT gen_random_uuid(), $1, recipient, 'queued', $3, NOW()
        FROM UNNEST($2::uuid[]) AS recipient
        "#,
    )
    .bind(program_id)
    .bind(user_ids)
    .bind(scheduled_for)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Recipients of a program: students of its course, or of all the owner's courses.
pub async fn program_recipients(pool: &PgPool, program: &EmailProgram) -> Result<Vec<Uuid>, sqlx::Error> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT DISTINCT e.user_id
        FROM entitlements e
        JOIN courses c ON c.id = e.course_id
        WHERE e.revoked_at IS NULL
          AND c.owner_id = $1
          AND ($2::uuid IS NULL OR c.id = $2)
        "#,
    )
    .bind(program.owner_id)
    .bind(program.course_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| r.0).collect())
}
