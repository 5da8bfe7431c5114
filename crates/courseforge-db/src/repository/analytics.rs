//! Aggregate queries backing the creator dashboards.

use courseforge_common::models::analytics::{CourseAnalytics, CreatorOverview};
use sqlx::PgPool;
use uuid::Uuid;

pub async fn course_analytics(pool: &PgPool, course_id: Uuid) -> Result<CourseAnalytics, sqlx::Error> {
    sqlx::query_as::<_, CourseAnalytics>(
        r#"
        WITH lesson_total AS (
            SELECT COUNT(*) AS n FROM lessons WHERE course_id = $1
        ),
        finished AS (
            SELECT lp.user_id
            FROM lesson_progress lp
            JOIN lessons l ON l.id = lp.lesson_id
            WHERE l.course_id = $1
            GROUP BY lp.user_id
            HAVING COUNT(*) = (SELECT n FROM lesson_total)
        )
        SELECT
            $1::uuid AS course_id,
            (SELECT COUNT(*) FROM entitlements WHERE course_id = $1 AND revoked_at IS NULL) AS enrollments,
            (SELECT COALESCE(SUM(amount_cents), 0)::bigint FROM orders WHERE course_id = $1 AND status = 'paid') AS revenue_cents,
            (SELECT COUNT(*) FROM orders WHERE course_id = $1 AND status = 'refunded') AS refunds,
            (SELECT n FROM lesson_total) AS lessons,
            (SELECT COUNT(*) FROM finished WHERE (SELECT n FROM lesson_total) > 0) AS completions,
            (SELECT COUNT(*) FROM forum_threads WHERE course_id = $1) AS forum_threads
        "#,
    )
    .bind(course_id)
    .fetch_one(pool)
    .await
}

pub async fn creator_overview(pool: &PgPool, owner_id: Uuid) -> Result<CreatorOverview, sqlx::Error> {
    sqlx::query_as::<_, CreatorOverview>(
        r#"
        SELECT
            (SELECT COUNT(*) FROM courses WHERE owner_id = $1) AS courses,
            (SELECT COUNT(*) FROM courses WHERE owner_id = $1 AND published) AS published_courses,
            (SELECT COUNT(DISTINCT e.user_id)
               FROM entitlements e JOIN courses c ON c.id = e.course_id
              WHERE c.owner_id = $1 AND e.revoked_at IS NULL) AS students,
            (SELECT COALESCE(SUM(o.amount_cents), 0)::bigint
               FROM orders o JOIN courses c ON c.id = o.course_id
              WHERE c.owner_id = $1 AND o.status = 'paid') AS revenue_cents,
            (SELECT COUNT(*) FROM email_programs WHERE owner_id = $1 AND active) AS active_email_programs,
            (SELECT COUNT(*) FROM video_batch_jobs
              WHERE owner_id = $1 AND status IN ('pending', 'processing')) AS pending_video_batches
        "#,
    )
    .bind(owner_id)
    .fetch_one(pool)
    .await
}
