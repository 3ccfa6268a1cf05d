use lms_core::model::{LessonId, Question, QuestionId};

use super::SqliteRepository;
use super::mapping::{answer_key_columns, db, id_i64, map_question_row, question_id_from_i64, ser};
use crate::repository::{QuestionRepository, StorageError};

const QUESTION_COLUMNS: &str = r"
    id, lesson_id, question_text, options, multi_select,
    correct_option_index, correct_option_indices, sort_order
";

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn insert_question(&self, question: &Question) -> Result<QuestionId, StorageError> {
        let options = serde_json::to_string(question.options()).map_err(ser)?;
        let (multi_select, correct_index, correct_indices) = answer_key_columns(question.key())?;

        let res = sqlx::query(
            r"
                INSERT INTO quiz_questions (
                    lesson_id, question_text, options, multi_select,
                    correct_option_index, correct_option_indices, sort_order
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(id_i64("lesson_id", question.lesson_id().value())?)
        .bind(question.text())
        .bind(options)
        .bind(multi_select)
        .bind(correct_index)
        .bind(correct_indices)
        .bind(question.order())
        .execute(&self.pool)
        .await
        .map_err(db)?;

        question_id_from_i64(res.last_insert_rowid())
    }

    async fn update_question(&self, question: &Question) -> Result<(), StorageError> {
        let options = serde_json::to_string(question.options()).map_err(ser)?;
        let (multi_select, correct_index, correct_indices) = answer_key_columns(question.key())?;

        let res = sqlx::query(
            r"
                UPDATE quiz_questions
                SET question_text = ?1,
                    options = ?2,
                    multi_select = ?3,
                    correct_option_index = ?4,
                    correct_option_indices = ?5,
                    sort_order = ?6
                WHERE id = ?7
            ",
        )
        .bind(question.text())
        .bind(options)
        .bind(multi_select)
        .bind(correct_index)
        .bind(correct_indices)
        .bind(question.order())
        .bind(id_i64("question_id", question.id().value())?)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError> {
        let res = sqlx::query("DELETE FROM quiz_questions WHERE id = ?1")
            .bind(id_i64("question_id", id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        let sql = format!("SELECT {QUESTION_COLUMNS} FROM quiz_questions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("question_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(map_question_row).transpose()
    }

    async fn questions_for_lesson(&self, lesson: LessonId) -> Result<Vec<Question>, StorageError> {
        let sql = format!(
            "SELECT {QUESTION_COLUMNS} FROM quiz_questions WHERE lesson_id = ?1 ORDER BY sort_order ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("lesson_id", lesson.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(map_question_row(row)?);
        }
        Ok(out)
    }
}
