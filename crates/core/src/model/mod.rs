mod attempt;
mod course;
mod ids;
mod lesson;
mod progress;
mod question;
mod user;

pub use ids::{AttemptId, CourseId, LessonId, ModuleId, ParseIdError, QuestionId, UserId};

pub use attempt::{
    Attempt, AttemptError, AttemptSummary, GradedAnswer, RedactedAnswer, SubmittedAnswer,
};
pub use course::{Course, CourseError, CourseModule, CourseTree, ModuleTree};
pub use lesson::{Lesson, LessonError, LessonType, QuizSettings};
pub use progress::{Progress, ProgressError};
pub use question::{
    AnswerKey, LearnerOption, LearnerQuestion, Question, QuestionDraft, QuestionError,
    QuestionPatch,
};
pub use user::User;
