use chrono::{DateTime, Utc};
use lms_core::model::{LessonId, Progress, UserId};
use lms_core::rollup::CompletionCounts;
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{
    course_id_from_i64, db, id_i64, map_progress_row, ser, user_id_from_i64,
};
use crate::repository::{ProgressRepository, StorageError};

pub(super) const PROGRESS_SELECT: &str = r"
    SELECT user_id, lesson_id, completed, score, completed_at
    FROM user_progress
    WHERE user_id = ?1 AND lesson_id = ?2
";

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError> {
        let row = sqlx::query(PROGRESS_SELECT)
            .bind(id_i64("user_id", user.value())?)
            .bind(id_i64("lesson_id", lesson.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(map_progress_row).transpose()
    }

    async fn progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT user_id, lesson_id, completed, score, completed_at
                FROM user_progress
                WHERE user_id = ?1
                ORDER BY lesson_id ASC
            ",
        )
        .bind(id_i64("user_id", user.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_progress_row(row)?);
        }
        Ok(out)
    }

    async fn mark_complete(
        &self,
        user: UserId,
        lesson: LessonId,
        now: DateTime<Utc>,
    ) -> Result<Progress, StorageError> {
        let user_id = id_i64("user_id", user.value())?;
        let lesson_id = id_i64("lesson_id", lesson.value())?;

        let mut tx = self.begin_write().await?;

        // An existing completion keeps its original timestamp.
        sqlx::query(
            r"
                INSERT INTO user_progress (user_id, lesson_id, completed, score, completed_at)
                VALUES (?1, ?2, 1, NULL, ?3)
                ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                    completed = 1,
                    completed_at = COALESCE(user_progress.completed_at, excluded.completed_at)
            ",
        )
        .bind(user_id)
        .bind(lesson_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        let row = sqlx::query(PROGRESS_SELECT)
            .bind(user_id)
            .bind(lesson_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        map_progress_row(&row)
    }

    async fn completed_counts(&self) -> Result<CompletionCounts, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT p.user_id AS user_id, m.course_id AS course_id, COUNT(*) AS completed
                FROM user_progress p
                JOIN lessons l ON l.id = p.lesson_id
                JOIN modules m ON m.id = l.module_id
                WHERE p.completed = 1
                GROUP BY p.user_id, m.course_id
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut counts = CompletionCounts::with_capacity(rows.len());
        for row in &rows {
            let user = user_id_from_i64(row.try_get("user_id").map_err(ser)?)?;
            let course = course_id_from_i64(row.try_get("course_id").map_err(ser)?)?;
            let completed: i64 = row.try_get("completed").map_err(ser)?;
            let completed = usize::try_from(completed)
                .map_err(|_| StorageError::Serialization(format!("invalid count: {completed}")))?;
            counts.insert((user, course), completed);
        }
        Ok(counts)
    }
}
