use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS courses (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            ordering INTEGER NOT NULL DEFAULT 0
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY,
            course_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS lessons (
            id INTEGER PRIMARY KEY,
            module_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            lesson_type TEXT NOT NULL CHECK (lesson_type IN ('video', 'text', 'quiz', 'pdf')),
            sort_order INTEGER NOT NULL DEFAULT 0,
            pass_mark_percentage INTEGER NOT NULL DEFAULT 0
                CHECK (pass_mark_percentage BETWEEN 0 AND 100),
            max_attempts INTEGER NOT NULL DEFAULT 0 CHECK (max_attempts >= 0),
            show_correct_answers INTEGER NOT NULL DEFAULT 1,
            randomize_questions INTEGER NOT NULL DEFAULT 0,
            randomize_answers INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (module_id) REFERENCES modules(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_questions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            lesson_id INTEGER NOT NULL,
            question_text TEXT NOT NULL,
            options TEXT NOT NULL,
            multi_select INTEGER NOT NULL DEFAULT 0,
            correct_option_index INTEGER,
            correct_option_indices TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            lesson_id INTEGER NOT NULL,
            score REAL NOT NULL CHECK (score >= 0.0 AND score <= 1.0),
            passed INTEGER NOT NULL,
            answers TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_progress (
            user_id INTEGER NOT NULL,
            lesson_id INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            score REAL,
            completed_at TEXT,
            PRIMARY KEY (user_id, lesson_id),
            CHECK (completed = 0 OR completed_at IS NOT NULL),
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
            FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_modules_course_order
            ON modules (course_id, sort_order);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_lessons_module_order
            ON lessons (module_id, sort_order);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_questions_lesson_order
            ON quiz_questions (lesson_id, sort_order);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_user_lesson_created
            ON quiz_attempts (user_id, lesson_id, created_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_lesson_created
            ON quiz_attempts (lesson_id, created_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_progress_lesson_completed
            ON user_progress (lesson_id, completed);
    ",
];

/// Runs the versioned migrations for the current schema.
///
/// Version 1 creates the catalog (courses, modules, lessons), quiz questions,
/// users, the attempt ledger and the progress ledger.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if is_applied(pool, 1).await? {
        debug!(version = 1, "schema already up to date");
        return Ok(());
    }

    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;
    for statement in SCHEMA_V1 {
        sqlx::query(statement).execute(&mut *tx).await?;
    }

    sqlx::query(
        r"
            INSERT INTO schema_migrations (version, applied_at)
            VALUES (?1, ?2)
            ON CONFLICT(version) DO NOTHING
        ",
    )
    .bind(1_i64)
    .bind(Utc::now())
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    debug!(version = 1, "applied schema migration");

    Ok(())
}
