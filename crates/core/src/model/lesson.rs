use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, ModuleId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum LessonError {
    #[error("lesson title cannot be empty")]
    EmptyTitle,

    #[error("pass mark must be between 0 and 100, got {0}")]
    InvalidPassMark(u32),

    #[error("unknown lesson type: {0}")]
    UnknownType(String),
}

//
// ─── LESSON TYPE ───────────────────────────────────────────────────────────────
//

/// Kind of content a lesson carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonType {
    Video,
    Text,
    Quiz,
    Pdf,
}

impl LessonType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            LessonType::Video => "video",
            LessonType::Text => "text",
            LessonType::Quiz => "quiz",
            LessonType::Pdf => "pdf",
        }
    }

    /// Parses the storage representation of a lesson type.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::UnknownType` for anything other than
    /// `video`, `text`, `quiz` or `pdf`.
    pub fn parse(raw: &str) -> Result<Self, LessonError> {
        match raw {
            "video" => Ok(Self::Video),
            "text" => Ok(Self::Text),
            "quiz" => Ok(Self::Quiz),
            "pdf" => Ok(Self::Pdf),
            other => Err(LessonError::UnknownType(other.to_owned())),
        }
    }

    #[must_use]
    pub fn is_quiz(self) -> bool {
        matches!(self, LessonType::Quiz)
    }
}

//
// ─── QUIZ SETTINGS ─────────────────────────────────────────────────────────────
//

/// Grading configuration of a quiz lesson.
///
/// - `pass_mark_percentage == 0` means every submission passes.
/// - `max_attempts == 0` means unlimited attempts.
/// - The randomize flags are presentation hints; scoring ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct QuizSettings {
    pass_mark_percentage: u32,
    max_attempts: u32,
    show_correct_answers: bool,
    randomize_questions: bool,
    randomize_answers: bool,
}

impl Default for QuizSettings {
    fn default() -> Self {
        Self {
            pass_mark_percentage: 0,
            max_attempts: 0,
            show_correct_answers: true,
            randomize_questions: false,
            randomize_answers: false,
        }
    }
}

impl QuizSettings {
    /// Creates quiz settings.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::InvalidPassMark` if the pass mark exceeds 100.
    pub fn new(
        pass_mark_percentage: u32,
        max_attempts: u32,
        show_correct_answers: bool,
    ) -> Result<Self, LessonError> {
        if pass_mark_percentage > 100 {
            return Err(LessonError::InvalidPassMark(pass_mark_percentage));
        }
        Ok(Self {
            pass_mark_percentage,
            max_attempts,
            show_correct_answers,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_randomization(mut self, questions: bool, answers: bool) -> Self {
        self.randomize_questions = questions;
        self.randomize_answers = answers;
        self
    }

    #[must_use]
    pub fn pass_mark_percentage(&self) -> u32 {
        self.pass_mark_percentage
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempt cap, or `None` when attempts are unlimited.
    #[must_use]
    pub fn attempt_cap(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }

    #[must_use]
    pub fn show_correct_answers(&self) -> bool {
        self.show_correct_answers
    }

    #[must_use]
    pub fn randomize_questions(&self) -> bool {
        self.randomize_questions
    }

    #[must_use]
    pub fn randomize_answers(&self) -> bool {
        self.randomize_answers
    }

    /// True when a pass mark or an attempt cap is configured.
    ///
    /// Only graded quizzes keep attempt rows; the rest are practice.
    #[must_use]
    pub fn is_graded(&self) -> bool {
        self.pass_mark_percentage > 0 || self.max_attempts > 0
    }
}

//
// ─── LESSON ────────────────────────────────────────────────────────────────────
//

/// Smallest orderable content unit inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    id: LessonId,
    module_id: ModuleId,
    title: String,
    lesson_type: LessonType,
    order: i64,
    quiz: QuizSettings,
}

impl Lesson {
    /// Creates a lesson.
    ///
    /// # Errors
    ///
    /// Returns `LessonError::EmptyTitle` if the title is blank.
    pub fn new(
        id: LessonId,
        module_id: ModuleId,
        title: impl Into<String>,
        lesson_type: LessonType,
        order: i64,
        quiz: QuizSettings,
    ) -> Result<Self, LessonError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(LessonError::EmptyTitle);
        }
        Ok(Self {
            id,
            module_id,
            title,
            lesson_type,
            order,
            quiz,
        })
    }

    #[must_use]
    pub fn id(&self) -> LessonId {
        self.id
    }

    #[must_use]
    pub fn module_id(&self) -> ModuleId {
        self.module_id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn lesson_type(&self) -> LessonType {
        self.lesson_type
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSettings {
        &self.quiz
    }

    #[must_use]
    pub fn is_quiz(&self) -> bool {
        self.lesson_type.is_quiz()
    }

    /// Pass mark shown next to a lesson in progress reports (0 for non-quiz lessons).
    #[must_use]
    pub fn pass_mark_context(&self) -> u32 {
        if self.is_quiz() {
            self.quiz.pass_mark_percentage
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lesson_type_round_trips_storage_names() {
        for kind in [
            LessonType::Video,
            LessonType::Text,
            LessonType::Quiz,
            LessonType::Pdf,
        ] {
            assert_eq!(LessonType::parse(kind.as_str()).unwrap(), kind);
        }
        assert!(matches!(
            LessonType::parse("audio"),
            Err(LessonError::UnknownType(_))
        ));
    }

    #[test]
    fn pass_mark_above_hundred_is_rejected() {
        assert_eq!(
            QuizSettings::new(101, 0, true).unwrap_err(),
            LessonError::InvalidPassMark(101)
        );
    }

    #[test]
    fn graded_means_pass_mark_or_cap() {
        assert!(!QuizSettings::default().is_graded());
        assert!(QuizSettings::new(50, 0, true).unwrap().is_graded());
        assert!(QuizSettings::new(0, 2, true).unwrap().is_graded());
        assert_eq!(QuizSettings::default().attempt_cap(), None);
        assert_eq!(QuizSettings::new(0, 2, true).unwrap().attempt_cap(), Some(2));
    }

    #[test]
    fn pass_mark_context_is_zero_for_non_quiz() {
        let settings = QuizSettings::new(70, 0, true).unwrap();
        let text = Lesson::new(
            LessonId::new(1),
            ModuleId::new(1),
            "Intro",
            LessonType::Text,
            0,
            settings,
        )
        .unwrap();
        assert_eq!(text.pass_mark_context(), 0);

        let quiz = Lesson::new(
            LessonId::new(2),
            ModuleId::new(1),
            "Check",
            LessonType::Quiz,
            1,
            settings,
        )
        .unwrap();
        assert_eq!(quiz.pass_mark_context(), 70);
    }

    #[test]
    fn blank_title_is_rejected() {
        let err = Lesson::new(
            LessonId::new(1),
            ModuleId::new(1),
            "   ",
            LessonType::Video,
            0,
            QuizSettings::default(),
        )
        .unwrap_err();
        assert_eq!(err, LessonError::EmptyTitle);
    }
}
