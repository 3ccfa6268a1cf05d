use thiserror::Error;

use crate::model::{AttemptError, CourseError, LessonError, ProgressError, QuestionError};
use crate::scoring::ScoringError;

/// Any domain validation failure raised by this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
}
