use lms_core::model::{LessonId, Progress, UserId};
use sqlx::Row;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, db, id_i64, map_attempt_row, map_progress_row, placeholders, ser,
};
use super::progress_repo::PROGRESS_SELECT;
use crate::repository::{
    AttemptRepository, AttemptRow, LedgerPersistence, PurgeCounts, StorageError,
    SubmissionReceipt, SubmissionRecord,
};

const ATTEMPT_COLUMNS: &str = "id, user_id, lesson_id, score, passed, answers, created_at";

fn count_u32(n: i64) -> Result<u32, StorageError> {
    u32::try_from(n).map_err(|_| StorageError::Serialization(format!("invalid count: {n}")))
}

impl SqliteRepository {
    async fn fetch_attempts(
        &self,
        filter: &str,
        binds: &[i64],
    ) -> Result<Vec<AttemptRow>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM quiz_attempts WHERE {filter} ORDER BY created_at DESC, id DESC"
        );
        let mut query = sqlx::query(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_attempt_row(row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn count_attempts(&self, user: UserId, lesson: LessonId) -> Result<u32, StorageError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS taken FROM quiz_attempts WHERE user_id = ?1 AND lesson_id = ?2",
        )
        .bind(id_i64("user_id", user.value())?)
        .bind(id_i64("lesson_id", lesson.value())?)
        .fetch_one(&self.pool)
        .await
        .map_err(db)?;
        count_u32(row.try_get("taken").map_err(ser)?)
    }

    async fn attempts_for(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        self.fetch_attempts(
            "user_id = ?1 AND lesson_id = ?2",
            &[
                id_i64("user_id", user.value())?,
                id_i64("lesson_id", lesson.value())?,
            ],
        )
        .await
    }

    async fn attempts_for_lesson(&self, lesson: LessonId) -> Result<Vec<AttemptRow>, StorageError> {
        self.fetch_attempts("lesson_id = ?1", &[id_i64("lesson_id", lesson.value())?])
            .await
    }

    async fn attempts_for_user(&self, user: UserId) -> Result<Vec<AttemptRow>, StorageError> {
        self.fetch_attempts("user_id = ?1", &[id_i64("user_id", user.value())?])
            .await
    }
}

#[async_trait::async_trait]
impl LedgerPersistence for SqliteRepository {
    async fn record_submission(
        &self,
        submission: SubmissionRecord,
    ) -> Result<SubmissionReceipt, StorageError> {
        let attempt = &submission.attempt;
        let user_id = id_i64("user_id", attempt.user_id().value())?;
        let lesson_id = id_i64("lesson_id", attempt.lesson_id().value())?;

        let mut tx = self.begin_write().await?;

        let row = sqlx::query(
            "SELECT COUNT(*) AS taken FROM quiz_attempts WHERE user_id = ?1 AND lesson_id = ?2",
        )
        .bind(user_id)
        .bind(lesson_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db)?;
        let existing = count_u32(row.try_get("taken").map_err(ser)?)?;

        if let Some(cap) = submission.attempt_cap {
            if existing >= cap {
                debug!(user_id, lesson_id, cap, existing, "attempt cap reached inside write");
                return Err(StorageError::AttemptCapReached {
                    cap,
                    taken: existing,
                });
            }
        }

        let attempt_id = if submission.persist_attempt {
            let answers = serde_json::to_string(attempt.answers()).map_err(ser)?;
            let res = sqlx::query(
                r"
                    INSERT INTO quiz_attempts (user_id, lesson_id, score, passed, answers, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
            )
            .bind(user_id)
            .bind(lesson_id)
            .bind(attempt.score())
            .bind(attempt.passed())
            .bind(answers)
            .bind(attempt.created_at())
            .execute(&mut *tx)
            .await
            .map_err(db)?;
            Some(attempt_id_from_i64(res.last_insert_rowid())?)
        } else {
            None
        };

        // Score tracks the latest attempt; completion never regresses.
        let completed_at = attempt.passed().then(|| attempt.created_at());
        sqlx::query(
            r"
                INSERT INTO user_progress (user_id, lesson_id, completed, score, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id, lesson_id) DO UPDATE SET
                    score = excluded.score,
                    completed = MAX(user_progress.completed, excluded.completed),
                    completed_at = CASE
                        WHEN user_progress.completed = 1 THEN user_progress.completed_at
                        ELSE excluded.completed_at
                    END
            ",
        )
        .bind(user_id)
        .bind(lesson_id)
        .bind(attempt.passed())
        .bind(attempt.score())
        .bind(completed_at)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        let row = sqlx::query(PROGRESS_SELECT)
            .bind(user_id)
            .bind(lesson_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db)?;
        let progress = map_progress_row(&row)?;

        tx.commit().await.map_err(db)?;

        Ok(SubmissionReceipt {
            attempt_id,
            attempts_taken: existing + u32::from(attempt_id.is_some()),
            progress,
        })
    }

    async fn reset_lesson(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError> {
        let user_id = id_i64("user_id", user.value())?;
        let lesson_id = id_i64("lesson_id", lesson.value())?;

        let mut tx = self.begin_write().await?;

        sqlx::query("DELETE FROM quiz_attempts WHERE user_id = ?1 AND lesson_id = ?2")
            .bind(user_id)
            .bind(lesson_id)
            .execute(&mut *tx)
            .await
            .map_err(db)?;

        sqlx::query(
            r"
                UPDATE user_progress
                SET completed = 0, score = NULL, completed_at = NULL
                WHERE user_id = ?1 AND lesson_id = ?2
            ",
        )
        .bind(user_id)
        .bind(lesson_id)
        .execute(&mut *tx)
        .await
        .map_err(db)?;

        let row = sqlx::query(PROGRESS_SELECT)
            .bind(user_id)
            .bind(lesson_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db)?;

        tx.commit().await.map_err(db)?;
        row.as_ref().map(map_progress_row).transpose()
    }

    async fn purge_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<PurgeCounts, StorageError> {
        if lessons.is_empty() {
            return Ok(PurgeCounts::default());
        }

        let user_id = id_i64("user_id", user.value())?;
        let mut lesson_ids = Vec::with_capacity(lessons.len());
        for lesson in lessons {
            lesson_ids.push(id_i64("lesson_id", lesson.value())?);
        }
        let scope = placeholders(2, lesson_ids.len());

        let mut tx = self.begin_write().await?;

        let sql = format!("DELETE FROM user_progress WHERE user_id = ?1 AND lesson_id IN ({scope})");
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in &lesson_ids {
            query = query.bind(*id);
        }
        let progress_deleted = query.execute(&mut *tx).await.map_err(db)?.rows_affected();

        let sql = format!("DELETE FROM quiz_attempts WHERE user_id = ?1 AND lesson_id IN ({scope})");
        let mut query = sqlx::query(&sql).bind(user_id);
        for id in &lesson_ids {
            query = query.bind(*id);
        }
        let attempts_deleted = query.execute(&mut *tx).await.map_err(db)?.rows_affected();

        tx.commit().await.map_err(db)?;

        Ok(PurgeCounts {
            progress_deleted,
            attempts_deleted,
        })
    }
}
