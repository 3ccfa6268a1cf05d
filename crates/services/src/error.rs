//! Shared error types for the services crate.

use thiserror::Error;

use lms_core::model::{AttemptError, CourseId, LessonId, QuestionError, QuestionId, UserId};
use lms_core::scoring::ScoringError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Caller-facing classification shared by every service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    NotFound,
    InvalidOperation,
    Validation,
    AttemptLimitExceeded,
    Storage,
}

/// Errors emitted by `QuizService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuizServiceError {
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),
    #[error("lesson {0} is not a quiz")]
    NotAQuiz(LessonId),
    #[error("maximum number of attempts ({cap}) reached for lesson {lesson}")]
    AttemptLimitExceeded { lesson: LessonId, cap: u32 },
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QuizServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LessonNotFound(_) | Self::QuestionNotFound(_) => ErrorKind::NotFound,
            Self::NotAQuiz(_) => ErrorKind::InvalidOperation,
            Self::AttemptLimitExceeded { .. } => ErrorKind::AttemptLimitExceeded,
            Self::Question(_) | Self::Scoring(_) | Self::Attempt(_) => ErrorKind::Validation,
            Self::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            Self::Storage(StorageError::AttemptCapReached { .. }) => {
                ErrorKind::AttemptLimitExceeded
            }
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Errors emitted by `ProgressService` and `AggregationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressServiceError {
    #[error("lesson {0} not found")]
    LessonNotFound(LessonId),
    #[error("course {0} not found")]
    CourseNotFound(CourseId),
    #[error("user {0} not found")]
    UserNotFound(UserId),
    #[error("lesson {0} is a quiz; it completes through quiz submissions")]
    QuizCompletion(LessonId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProgressServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::LessonNotFound(_)
            | Self::CourseNotFound(_)
            | Self::UserNotFound(_)
            | Self::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            Self::QuizCompletion(_) => ErrorKind::InvalidOperation,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
}
