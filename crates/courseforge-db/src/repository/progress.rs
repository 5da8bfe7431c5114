//! Lesson completion and learning streaks.

use courseforge_common::models::course::LessonProgress;
use courseforge_common::models::user::LearningStreak;
use courseforge_common::streak::StreakState;
use sqlx::PgPool;
use uuid::Uuid;

/// Mark a lesson complete. Returns false if it already was.
pub async fn mark_complete(pool: &PgPool, user_id: Uuid, lesson_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO lesson_progress (user_id, lesson_id, completed_at)
        VALUES ($1, $2, NOW())
        ON CONFLICT (user_id, lesson_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Completed lessons of one course for one student.
pub async fn list_for_course(
    pool: &PgPool,
    user_id: Uuid,
    course_id: Uuid,
) -> Result<Vec<LessonProgress>, sqlx::Error> {
    sqlx::query_as::<_, LessonProgress>(
        r#"
        SELECT lp.* FROM lesson_progress lp
        JOIN lessons l ON l.id = lp.lesson_id
        WHERE lp.user_id = $1 AND l.course_id = $2
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(pool)
    .await
}

pub async fn find_streak(pool: &PgPool, user_id: Uuid) -> Result<Option<LearningStreak>, sqlx::Error> {
    sqlx::query_as::<_, LearningStreak>("SELECT * FROM learning_streaks WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn save_streak(
    pool: &PgPool,
    user_id: Uuid,
    state: StreakState,
) -> Result<LearningStreak, sqlx::Error> {
    sqlx::query_as::<_, LearningStreak>(
        r#"
        INSERT INTO learning_streaks (user_id, current_streak, longest_streak, last_activity_date, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (user_id) DO UPDATE SET
            current_streak = EXCLUDED.current_streak,
            longest_streak = EXCLUDED.longest_streak,
            last_activity_date = EXCLUDED.last_activity_date,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(state.current)
    .bind(state.longest)
    .bind(state.last_activity)
    .fetch_one(pool)
    .await
}
