use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use lms_core::model::{
    AnswerKey, Attempt, AttemptId, Course, CourseId, CourseModule, GradedAnswer, Lesson, LessonId,
    LessonType, ModuleId, Progress, Question, QuestionId, QuizSettings, User, UserId,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{AttemptRow, StorageError};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, surfacing foreign-key violations as `Conflict`.
pub(crate) fn db<E: Into<sqlx::Error>>(e: E) -> StorageError {
    match e.into() {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => StorageError::Conflict,
        sqlx::Error::Database(db) if db.is_unique_violation() => StorageError::Conflict,
        other => StorageError::Connection(other.to_string()),
    }
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn u64_from_i64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(u64_from_i64("user_id", v)?))
}

pub(crate) fn course_id_from_i64(v: i64) -> Result<CourseId, StorageError> {
    Ok(CourseId::new(u64_from_i64("course_id", v)?))
}

pub(crate) fn lesson_id_from_i64(v: i64) -> Result<LessonId, StorageError> {
    Ok(LessonId::new(u64_from_i64("lesson_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(u64_from_i64("question_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(u64_from_i64("attempt_id", v)?))
}

fn get_i64(row: &SqliteRow, column: &str) -> Result<i64, StorageError> {
    row.try_get::<i64, _>(column).map_err(ser)
}

fn get_bool(row: &SqliteRow, column: &str) -> Result<bool, StorageError> {
    Ok(get_i64(row, column)? != 0)
}

pub(crate) fn map_course_row(row: &SqliteRow) -> Result<Course, StorageError> {
    Course::new(
        course_id_from_i64(get_i64(row, "id")?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        get_i64(row, "ordering")?,
    )
    .map_err(ser)
}

pub(crate) fn map_module_row(row: &SqliteRow) -> Result<CourseModule, StorageError> {
    CourseModule::new(
        ModuleId::new(u64_from_i64("module_id", get_i64(row, "id")?)?),
        course_id_from_i64(get_i64(row, "course_id")?)?,
        row.try_get::<String, _>("title").map_err(ser)?,
        get_i64(row, "sort_order")?,
    )
    .map_err(ser)
}

pub(crate) fn map_lesson_row(row: &SqliteRow) -> Result<Lesson, StorageError> {
    let kind: String = row.try_get("lesson_type").map_err(ser)?;
    let settings = QuizSettings::new(
        u32_from_i64("pass_mark_percentage", get_i64(row, "pass_mark_percentage")?)?,
        u32_from_i64("max_attempts", get_i64(row, "max_attempts")?)?,
        get_bool(row, "show_correct_answers")?,
    )
    .map_err(ser)?
    .with_randomization(
        get_bool(row, "randomize_questions")?,
        get_bool(row, "randomize_answers")?,
    );

    Lesson::new(
        lesson_id_from_i64(get_i64(row, "id")?)?,
        ModuleId::new(u64_from_i64("module_id", get_i64(row, "module_id")?)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        LessonType::parse(&kind).map_err(ser)?,
        get_i64(row, "sort_order")?,
        settings,
    )
    .map_err(ser)
}

/// Storage columns for an answer key: (multi_select, single index, JSON index set).
pub(crate) fn answer_key_columns(
    key: &AnswerKey,
) -> Result<(bool, Option<i64>, Option<String>), StorageError> {
    match key {
        AnswerKey::Single(index) => Ok((false, Some(i64::from(*index)), None)),
        AnswerKey::Multi(set) => {
            let json = serde_json::to_string(set).map_err(ser)?;
            Ok((true, None, Some(json)))
        }
    }
}

pub(crate) fn map_question_row(row: &SqliteRow) -> Result<Question, StorageError> {
    let options: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("options").map_err(ser)?).map_err(ser)?;

    let key = if get_bool(row, "multi_select")? {
        let raw: Option<String> = row.try_get("correct_option_indices").map_err(ser)?;
        let raw = raw.ok_or_else(|| ser("multi-select question without correct_option_indices"))?;
        let set: BTreeSet<u32> = serde_json::from_str(&raw).map_err(ser)?;
        AnswerKey::Multi(set)
    } else {
        let raw: Option<i64> = row.try_get("correct_option_index").map_err(ser)?;
        let raw = raw.ok_or_else(|| ser("single-select question without correct_option_index"))?;
        AnswerKey::Single(u32_from_i64("correct_option_index", raw)?)
    };

    Question::new(
        question_id_from_i64(get_i64(row, "id")?)?,
        lesson_id_from_i64(get_i64(row, "lesson_id")?)?,
        row.try_get::<String, _>("question_text").map_err(ser)?,
        options,
        key,
        get_i64(row, "sort_order")?,
    )
    .map_err(ser)
}

pub(crate) fn map_user_row(row: &SqliteRow) -> Result<User, StorageError> {
    Ok(User::new(
        user_id_from_i64(get_i64(row, "id")?)?,
        row.try_get::<String, _>("email").map_err(ser)?,
        row.try_get::<String, _>("first_name").map_err(ser)?,
        row.try_get::<String, _>("last_name").map_err(ser)?,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    ))
}

pub(crate) fn map_progress_row(row: &SqliteRow) -> Result<Progress, StorageError> {
    Progress::from_persisted(
        user_id_from_i64(get_i64(row, "user_id")?)?,
        lesson_id_from_i64(get_i64(row, "lesson_id")?)?,
        get_bool(row, "completed")?,
        row.try_get::<Option<f64>, _>("score").map_err(ser)?,
        row.try_get::<Option<DateTime<Utc>>, _>("completed_at")
            .map_err(ser)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &SqliteRow) -> Result<AttemptRow, StorageError> {
    let answers: Vec<GradedAnswer> =
        serde_json::from_str(&row.try_get::<String, _>("answers").map_err(ser)?).map_err(ser)?;

    let attempt = Attempt::new(
        user_id_from_i64(get_i64(row, "user_id")?)?,
        lesson_id_from_i64(get_i64(row, "lesson_id")?)?,
        row.try_get::<f64, _>("score").map_err(ser)?,
        get_bool(row, "passed")?,
        answers,
        row.try_get::<DateTime<Utc>, _>("created_at").map_err(ser)?,
    )
    .map_err(ser)?;

    Ok(AttemptRow {
        id: attempt_id_from_i64(get_i64(row, "id")?)?,
        attempt,
    })
}

/// `?start, ?start+1, …` placeholders for an `IN (…)` list.
pub(crate) fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}
