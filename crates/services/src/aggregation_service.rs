use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use lms_core::model::{CourseId, LessonId, ModuleId, Progress, UserId};
use lms_core::rollup::{self, AttemptFold, CourseProgressReport, UserOverview};
use storage::repository::{
    AttemptRepository, CatalogRepository, LedgerPersistence, ProgressRepository, PurgeCounts,
    UserRepository,
};

use crate::error::ProgressServiceError;

/// Administrative rollups across users and courses, and scoped resets.
#[derive(Clone)]
pub struct AggregationService {
    catalog: Arc<dyn CatalogRepository>,
    users: Arc<dyn UserRepository>,
    progress: Arc<dyn ProgressRepository>,
    attempts: Arc<dyn AttemptRepository>,
    ledger: Arc<dyn LedgerPersistence>,
}

impl AggregationService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        users: Arc<dyn UserRepository>,
        progress: Arc<dyn ProgressRepository>,
        attempts: Arc<dyn AttemptRepository>,
        ledger: Arc<dyn LedgerPersistence>,
    ) -> Self {
        Self {
            catalog,
            users,
            progress,
            attempts,
            ledger,
        }
    }

    /// One report per course in the system, with attempt detail on quiz lessons.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::UserNotFound` if the user is missing.
    pub async fn user_detailed_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CourseProgressReport>, ProgressServiceError> {
        if self.users.get_user(user_id).await?.is_none() {
            return Err(ProgressServiceError::UserNotFound(user_id));
        }

        let trees = self.catalog.course_trees().await?;
        let progress: HashMap<LessonId, Progress> = self
            .progress
            .progress_for_user(user_id)
            .await?
            .into_iter()
            .map(|p| (p.lesson_id(), p))
            .collect();
        let rows = self.attempts.attempts_for_user(user_id).await?;
        let folds = AttemptFold::by_lesson(rows.iter().map(|row| &row.attempt));

        Ok(trees
            .iter()
            .map(|tree| rollup::detailed_course_report(tree, &progress, &folds))
            .collect())
    }

    /// Completion percentage per course for every user, newest user first.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if repository access fails.
    pub async fn admin_overview(&self) -> Result<Vec<UserOverview>, ProgressServiceError> {
        let users = self.users.list_users().await?;
        let trees = self.catalog.course_trees().await?;
        let counts = self.progress.completed_counts().await?;
        debug!(
            users = users.len(),
            courses = trees.len(),
            groups = counts.len(),
            "building admin overview"
        );
        Ok(rollup::admin_overview(&users, &trees, &counts))
    }

    /// Delete the user's progress and attempts for every lesson in the course.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::CourseNotFound` if the course is missing.
    pub async fn reset_course_progress(
        &self,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<PurgeCounts, ProgressServiceError> {
        let tree = self
            .catalog
            .course_tree(course_id)
            .await?
            .ok_or(ProgressServiceError::CourseNotFound(course_id))?;
        let counts = self.purge(user_id, &tree.lesson_ids()).await?;
        info!(
            user_id = user_id.value(),
            course_id = course_id.value(),
            progress_deleted = counts.progress_deleted,
            attempts_deleted = counts.attempts_deleted,
            "course progress reset"
        );
        Ok(counts)
    }

    /// Delete the user's progress and attempts for every lesson in the module.
    ///
    /// A module without lessons, or an unknown module, resets nothing.
    ///
    /// # Errors
    ///
    /// Returns `ProgressServiceError::Storage` if the write fails.
    pub async fn reset_module_progress(
        &self,
        user_id: UserId,
        module_id: ModuleId,
    ) -> Result<PurgeCounts, ProgressServiceError> {
        let lessons = self.catalog.module_lesson_ids(module_id).await?;
        let counts = self.purge(user_id, &lessons).await?;
        info!(
            user_id = user_id.value(),
            module_id = module_id.value(),
            progress_deleted = counts.progress_deleted,
            attempts_deleted = counts.attempts_deleted,
            "module progress reset"
        );
        Ok(counts)
    }

    async fn purge(
        &self,
        user_id: UserId,
        lessons: &[LessonId],
    ) -> Result<PurgeCounts, ProgressServiceError> {
        if lessons.is_empty() {
            return Ok(PurgeCounts::default());
        }
        Ok(self.ledger.purge_lessons(user_id, lessons).await?)
    }
}
