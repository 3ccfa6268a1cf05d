use std::sync::Arc;

use async_trait::async_trait;
use lms_core::model::{
    Course, CourseId, CourseModule, CourseTree, Lesson, LessonId, ModuleId, SubmittedAnswer,
    UserId,
};
use lms_core::time::fixed_now;
use services::{AggregationService, Clock, ErrorKind, ProgressService, QuizService};
use storage::repository::{CatalogRepository, InMemoryRepository, StorageError};

/// Catalog whose backend is unreachable.
struct OfflineCatalog;

fn offline() -> StorageError {
    StorageError::Connection("database is offline".into())
}

#[async_trait]
impl CatalogRepository for OfflineCatalog {
    async fn upsert_course(&self, _course: &Course) -> Result<(), StorageError> {
        Err(offline())
    }

    async fn upsert_module(&self, _module: &CourseModule) -> Result<(), StorageError> {
        Err(offline())
    }

    async fn upsert_lesson(&self, _lesson: &Lesson) -> Result<(), StorageError> {
        Err(offline())
    }

    async fn get_lesson(&self, _id: LessonId) -> Result<Option<Lesson>, StorageError> {
        Err(offline())
    }

    async fn course_tree(&self, _id: CourseId) -> Result<Option<CourseTree>, StorageError> {
        Err(offline())
    }

    async fn course_trees(&self) -> Result<Vec<CourseTree>, StorageError> {
        Err(offline())
    }

    async fn module_lesson_ids(&self, _module: ModuleId) -> Result<Vec<LessonId>, StorageError> {
        Err(offline())
    }
}

#[tokio::test]
async fn storage_failures_surface_as_storage_kind() {
    let repo = Arc::new(InMemoryRepository::new());
    let catalog: Arc<dyn CatalogRepository> = Arc::new(OfflineCatalog);
    let clock = Clock::fixed(fixed_now());

    let quiz = QuizService::new(
        clock,
        Arc::clone(&catalog),
        repo.clone(),
        repo.clone(),
        repo.clone(),
        repo.clone(),
    );
    let err = quiz
        .submit(
            UserId::new(1),
            LessonId::new(1),
            vec![SubmittedAnswer::default()],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
    assert!(err.to_string().contains("database is offline"));

    let progress = ProgressService::new(clock, Arc::clone(&catalog), repo.clone());
    let err = progress
        .mark_complete(UserId::new(1), LessonId::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    let aggregation = AggregationService::new(catalog, repo.clone(), repo.clone(), repo.clone(), repo);
    let err = aggregation
        .reset_module_progress(UserId::new(1), ModuleId::new(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);
}
