use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use lms_core::model::{CourseId, LessonId, Progress, UserId};
use lms_core::rollup::{self, CourseProgressReport};
use storage::repository::{CatalogRepository, ProgressRepository};

use crate::Clock;
use crate::error::ProgressServiceError;

/// Completion of non-quiz lessons and the learner-facing course rollup.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    progress: Arc<dyn ProgressRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        progress: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            progress,
        }
    }

    /// Mark a video, text or PDF lesson complete.
    ///
    /// Calling it again returns the stored record unchanged.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::LessonNotFound` if the lesson is missing
    /// and `ProgressServiceError::QuizCompletion` for quiz lessons.
    pub async fn mark_complete(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Progress, ProgressServiceError> {
        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or(ProgressServiceError::LessonNotFound(lesson_id))?;
        if lesson.is_quiz() {
            return Err(ProgressServiceError::QuizCompletion(lesson_id));
        }

        let progress = self
            .progress
            .mark_complete(user_id, lesson_id, self.clock.now())
            .await?;
        info!(
            user_id = user_id.value(),
            lesson_id = lesson_id.value(),
            "lesson marked complete"
        );
        Ok(progress)
    }

    /// Per-lesson completion rolled up into module totals and a course percentage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::CourseNotFound` if the course is missing.
    pub async fn course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgressReport, ProgressServiceError> {
        let tree = self
            .catalog
            .course_tree(course_id)
            .await?
            .ok_or(ProgressServiceError::CourseNotFound(course_id))?;
        let progress: HashMap<LessonId, Progress> = self
            .progress
            .progress_for_user(user_id)
            .await?
            .into_iter()
            .map(|p| (p.lesson_id(), p))
            .collect();
        Ok(rollup::course_report(&tree, &progress))
    }
}
