use std::collections::HashMap;

use lms_core::model::{
    Course, CourseId, CourseModule, CourseTree, Lesson, LessonId, ModuleId, ModuleTree,
};

use super::SqliteRepository;
use super::mapping::{
    db, id_i64, lesson_id_from_i64, map_course_row, map_lesson_row, map_module_row, ser,
};
use crate::repository::{CatalogRepository, StorageError};

const LESSON_COLUMNS: &str = r"
    id, module_id, title, lesson_type, sort_order,
    pass_mark_percentage, max_attempts, show_correct_answers,
    randomize_questions, randomize_answers
";

impl SqliteRepository {
    /// Loads modules and lessons for `courses` and assembles one tree per course.
    ///
    /// `only` restricts both loads to a single course.
    async fn assemble_trees(
        &self,
        courses: Vec<Course>,
        only: Option<CourseId>,
    ) -> Result<Vec<CourseTree>, StorageError> {
        if courses.is_empty() {
            return Ok(Vec::new());
        }

        let (module_filter, lesson_filter) = if only.is_some() {
            (
                "WHERE course_id = ?1",
                "WHERE module_id IN (SELECT id FROM modules WHERE course_id = ?1)",
            )
        } else {
            ("", "")
        };
        let course_id = only
            .map(|id| id_i64("course_id", id.value()))
            .transpose()?;

        let module_sql = format!(
            "SELECT id, course_id, title, sort_order FROM modules {module_filter} \
             ORDER BY course_id ASC, sort_order ASC, id ASC"
        );
        let mut module_query = sqlx::query(&module_sql);
        if let Some(id) = course_id {
            module_query = module_query.bind(id);
        }
        let module_rows = module_query.fetch_all(&self.pool).await.map_err(db)?;

        let lesson_sql = format!(
            "SELECT {LESSON_COLUMNS} FROM lessons {lesson_filter} \
             ORDER BY module_id ASC, sort_order ASC, id ASC"
        );
        let mut lesson_query = sqlx::query(&lesson_sql);
        if let Some(id) = course_id {
            lesson_query = lesson_query.bind(id);
        }
        let lesson_rows = lesson_query.fetch_all(&self.pool).await.map_err(db)?;

        let mut lessons_by_module: HashMap<ModuleId, Vec<Lesson>> = HashMap::new();
        for row in &lesson_rows {
            let lesson = map_lesson_row(row)?;
            lessons_by_module
                .entry(lesson.module_id())
                .or_default()
                .push(lesson);
        }

        let mut modules_by_course: HashMap<CourseId, Vec<ModuleTree>> = HashMap::new();
        for row in &module_rows {
            let module = map_module_row(row)?;
            let lessons = lessons_by_module.remove(&module.id()).unwrap_or_default();
            modules_by_course
                .entry(module.course_id())
                .or_default()
                .push(ModuleTree { module, lessons });
        }

        let mut out = Vec::with_capacity(courses.len());
        for course in courses {
            let modules = modules_by_course.remove(&course.id()).unwrap_or_default();
            out.push(CourseTree::new(course, modules).map_err(ser)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO courses (id, title, ordering)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    ordering = excluded.ordering
            ",
        )
        .bind(id_i64("course_id", course.id().value())?)
        .bind(course.title())
        .bind(course.ordering())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn upsert_module(&self, module: &CourseModule) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO modules (id, course_id, title, sort_order)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(id) DO UPDATE SET
                    course_id = excluded.course_id,
                    title = excluded.title,
                    sort_order = excluded.sort_order
            ",
        )
        .bind(id_i64("module_id", module.id().value())?)
        .bind(id_i64("course_id", module.course_id().value())?)
        .bind(module.title())
        .bind(module.order())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let quiz = lesson.quiz();
        sqlx::query(
            r"
                INSERT INTO lessons (
                    id, module_id, title, lesson_type, sort_order,
                    pass_mark_percentage, max_attempts, show_correct_answers,
                    randomize_questions, randomize_answers
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    module_id = excluded.module_id,
                    title = excluded.title,
                    lesson_type = excluded.lesson_type,
                    sort_order = excluded.sort_order,
                    pass_mark_percentage = excluded.pass_mark_percentage,
                    max_attempts = excluded.max_attempts,
                    show_correct_answers = excluded.show_correct_answers,
                    randomize_questions = excluded.randomize_questions,
                    randomize_answers = excluded.randomize_answers
            ",
        )
        .bind(id_i64("lesson_id", lesson.id().value())?)
        .bind(id_i64("module_id", lesson.module_id().value())?)
        .bind(lesson.title())
        .bind(lesson.lesson_type().as_str())
        .bind(lesson.order())
        .bind(i64::from(quiz.pass_mark_percentage()))
        .bind(i64::from(quiz.max_attempts()))
        .bind(quiz.show_correct_answers())
        .bind(quiz.randomize_questions())
        .bind(quiz.randomize_answers())
        .execute(&self.pool)
        .await
        .map_err(db)?;
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        let sql = format!("SELECT {LESSON_COLUMNS} FROM lessons WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("lesson_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        row.as_ref().map(map_lesson_row).transpose()
    }

    async fn course_tree(&self, id: CourseId) -> Result<Option<CourseTree>, StorageError> {
        let row = sqlx::query("SELECT id, title, ordering FROM courses WHERE id = ?1")
            .bind(id_i64("course_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let course = map_course_row(&row)?;
        Ok(self.assemble_trees(vec![course], Some(id)).await?.pop())
    }

    async fn course_trees(&self) -> Result<Vec<CourseTree>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, title, ordering
                FROM courses
                ORDER BY ordering ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut courses = Vec::with_capacity(rows.len());
        for row in &rows {
            courses.push(map_course_row(row)?);
        }
        self.assemble_trees(courses, None).await
    }

    async fn module_lesson_ids(&self, module: ModuleId) -> Result<Vec<LessonId>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id
                FROM lessons
                WHERE module_id = ?1
                ORDER BY sort_order ASC, id ASC
            ",
        )
        .bind(id_i64("module_id", module.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = sqlx::Row::try_get(&row, "id").map_err(ser)?;
            out.push(lesson_id_from_i64(id)?);
        }
        Ok(out)
    }
}
