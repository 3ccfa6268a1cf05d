use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use rand::rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info, warn};

use lms_core::model::{
    Attempt, AttemptSummary, LearnerQuestion, Lesson, LessonId, Progress, Question,
    QuestionDraft, QuestionId, QuestionPatch, QuizSettings, SubmittedAnswer, User, UserId,
};
use lms_core::rollup::AttemptFold;
use lms_core::scoring::{self, AnswerFeedback};
use storage::repository::{
    AttemptRepository, CatalogRepository, LedgerPersistence, QuestionRepository, StorageError,
    SubmissionRecord, UserRepository,
};

use crate::Clock;
use crate::error::QuizServiceError;

/// Outcome of one quiz submission as returned to the learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResult {
    pub total_questions: usize,
    pub correct_answers: usize,
    pub score: f64,
    pub passed: bool,
    pub pass_mark_percentage: u32,
    pub max_attempts: u32,
    /// Recorded attempts after this one; always 0 for ungraded practice quizzes.
    pub attempts_taken: u32,
    pub show_correct_answers: bool,
    pub results: Vec<AnswerFeedback>,
}

/// One learner's attempt history on a lesson, folded for administrators.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerAttemptStats {
    pub user_id: UserId,
    pub name: String,
    pub email: String,
    pub attempt_count: u32,
    pub best_score: f64,
    pub passed: bool,
}

/// Question administration, learner presentation and quiz submission.
#[derive(Clone)]
pub struct QuizService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    questions: Arc<dyn QuestionRepository>,
    users: Arc<dyn UserRepository>,
    attempts: Arc<dyn AttemptRepository>,
    ledger: Arc<dyn LedgerPersistence>,
}

impl QuizService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        questions: Arc<dyn QuestionRepository>,
        users: Arc<dyn UserRepository>,
        attempts: Arc<dyn AttemptRepository>,
        ledger: Arc<dyn LedgerPersistence>,
    ) -> Self {
        Self {
            clock,
            catalog,
            questions,
            users,
            attempts,
            ledger,
        }
    }

    async fn lesson(&self, lesson_id: LessonId) -> Result<Lesson, QuizServiceError> {
        self.catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or(QuizServiceError::LessonNotFound(lesson_id))
    }

    async fn quiz_lesson(&self, lesson_id: LessonId) -> Result<Lesson, QuizServiceError> {
        let lesson = self.lesson(lesson_id).await?;
        if !lesson.is_quiz() {
            return Err(QuizServiceError::NotAQuiz(lesson_id));
        }
        Ok(lesson)
    }

    /// Add a question to a quiz lesson.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::LessonNotFound` or `NotAQuiz` for a bad target,
    /// `QuizServiceError::Question` if the draft is invalid, and
    /// `QuizServiceError::Storage` if persistence fails.
    pub async fn create_question(
        &self,
        lesson_id: LessonId,
        draft: QuestionDraft,
    ) -> Result<Question, QuizServiceError> {
        self.quiz_lesson(lesson_id).await?;
        let question = draft.into_question(QuestionId::new(0), lesson_id)?;
        let id = self.questions.insert_question(&question).await?;
        info!(lesson_id = lesson_id.value(), question_id = id.value(), "question created");
        Ok(question.with_id(id))
    }

    /// Apply a partial update; the merged question is validated as a whole.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::QuestionNotFound` if the question is missing,
    /// `QuizServiceError::Question` if the merged question is invalid.
    pub async fn update_question(
        &self,
        question_id: QuestionId,
        patch: QuestionPatch,
    ) -> Result<Question, QuizServiceError> {
        let current = self
            .questions
            .get_question(question_id)
            .await?
            .ok_or(QuizServiceError::QuestionNotFound(question_id))?;
        let updated = current.apply_patch(patch)?;
        self.questions
            .update_question(&updated)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => QuizServiceError::QuestionNotFound(question_id),
                other => other.into(),
            })?;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `QuizServiceError::QuestionNotFound` if nothing was deleted.
    pub async fn delete_question(&self, question_id: QuestionId) -> Result<(), QuizServiceError> {
        self.questions
            .delete_question(question_id)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => QuizServiceError::QuestionNotFound(question_id),
                other => other.into(),
            })?;
        info!(question_id = question_id.value(), "question deleted");
        Ok(())
    }

    /// Questions of a lesson with their answer keys, in display order.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::LessonNotFound` if the lesson is missing.
    pub async fn list_questions(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<Question>, QuizServiceError> {
        self.lesson(lesson_id).await?;
        Ok(self.questions.questions_for_lesson(lesson_id).await?)
    }

    /// Questions as a learner sees them: no answer keys, shuffled when the
    /// lesson asks for it.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::LessonNotFound` if the lesson is missing.
    pub async fn learner_questions(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<LearnerQuestion>, QuizServiceError> {
        let lesson = self.lesson(lesson_id).await?;
        let questions = self.questions.questions_for_lesson(lesson_id).await?;
        Ok(present(&questions, lesson.quiz(), &mut rng()))
    }

    /// Grade and record a submission.
    ///
    /// # Errors
    ///
    /// - `LessonNotFound` / `NotAQuiz` for a bad target.
    /// - `AttemptLimitExceeded` once the lesson's cap is met.
    /// - `Scoring` for empty quizzes, foreign or duplicate answers.
    /// - `Storage` if the write fails.
    pub async fn submit(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        answers: Vec<SubmittedAnswer>,
    ) -> Result<SubmissionResult, QuizServiceError> {
        let lesson = self.quiz_lesson(lesson_id).await?;
        let settings = lesson.quiz();

        if let Some(cap) = settings.attempt_cap() {
            let taken = self.attempts.count_attempts(user_id, lesson_id).await?;
            if taken >= cap {
                warn!(
                    user_id = user_id.value(),
                    lesson_id = lesson_id.value(),
                    cap,
                    "submission rejected: attempt cap reached"
                );
                return Err(QuizServiceError::AttemptLimitExceeded {
                    lesson: lesson_id,
                    cap,
                });
            }
        }

        let questions = self.questions.questions_for_lesson(lesson_id).await?;
        let outcome = scoring::grade(&questions, &answers, settings.pass_mark_percentage())
            .inspect_err(|e| {
                warn!(
                    user_id = user_id.value(),
                    lesson_id = lesson_id.value(),
                    error = %e,
                    "submission rejected"
                );
            })?;
        debug!(
            user_id = user_id.value(),
            lesson_id = lesson_id.value(),
            correct = outcome.correct_answers,
            total = outcome.total_questions,
            percentage = outcome.score_percentage,
            "submission graded"
        );

        let attempt = Attempt::new(
            user_id,
            lesson_id,
            outcome.score,
            outcome.passed,
            outcome.answers.clone(),
            self.clock.now(),
        )?;
        let keep_history = settings.is_graded();
        let receipt = self
            .ledger
            .record_submission(SubmissionRecord {
                attempt,
                persist_attempt: keep_history,
                attempt_cap: settings.attempt_cap(),
            })
            .await
            .map_err(|e| match e {
                StorageError::AttemptCapReached { cap, .. } => {
                    QuizServiceError::AttemptLimitExceeded {
                        lesson: lesson_id,
                        cap,
                    }
                }
                other => other.into(),
            })?;

        info!(
            user_id = user_id.value(),
            lesson_id = lesson_id.value(),
            score = outcome.score,
            passed = outcome.passed,
            completed = receipt.progress.is_completed(),
            "quiz submitted"
        );

        Ok(SubmissionResult {
            total_questions: outcome.total_questions,
            correct_answers: outcome.correct_answers,
            score: outcome.score,
            passed: outcome.passed,
            pass_mark_percentage: settings.pass_mark_percentage(),
            max_attempts: settings.max_attempts(),
            attempts_taken: if keep_history { receipt.attempts_taken } else { 0 },
            show_correct_answers: settings.show_correct_answers(),
            results: outcome.feedback(settings.show_correct_answers()),
        })
    }

    /// The learner's own attempt history on a lesson, newest first.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if repository access fails.
    pub async fn attempts(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Vec<AttemptSummary>, QuizServiceError> {
        let rows = self.attempts.attempts_for(user_id, lesson_id).await?;
        Ok(rows
            .into_iter()
            .map(|row| AttemptSummary {
                id: row.id,
                score: row.attempt.score(),
                passed: row.attempt.passed(),
                created_at: row.attempt.created_at(),
            })
            .collect())
    }

    /// One row per learner who attempted the lesson, most recent attempter first.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if repository access fails.
    pub async fn attempts_admin(
        &self,
        lesson_id: LessonId,
    ) -> Result<Vec<LearnerAttemptStats>, QuizServiceError> {
        let rows = self.attempts.attempts_for_lesson(lesson_id).await?;
        let folds = AttemptFold::by_user(rows.iter().map(|row| &row.attempt));
        if folds.is_empty() {
            return Ok(Vec::new());
        }

        let users: HashMap<UserId, User> = self
            .users
            .list_users()
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

        Ok(folds
            .into_iter()
            .map(|(user_id, fold)| {
                let user = users.get(&user_id);
                LearnerAttemptStats {
                    user_id,
                    name: user.map(User::display_name).unwrap_or_default(),
                    email: user.map(|u| u.email.clone()).unwrap_or_default(),
                    attempt_count: fold.attempt_count,
                    best_score: fold.best_score.unwrap_or_default(),
                    passed: fold.passed,
                }
            })
            .collect())
    }

    /// Delete the learner's attempts and reopen the lesson for a retake.
    ///
    /// Returns the reopened progress, if the learner had any.
    ///
    /// # Errors
    ///
    /// Returns `QuizServiceError::Storage` if the write fails.
    pub async fn reset_attempts(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<Option<Progress>, QuizServiceError> {
        let progress = self.ledger.reset_lesson(user_id, lesson_id).await?;
        info!(
            user_id = user_id.value(),
            lesson_id = lesson_id.value(),
            "quiz attempts reset"
        );
        Ok(progress)
    }
}

/// Learner projection of `questions`, shuffled per the lesson's settings.
fn present<R: Rng + ?Sized>(
    questions: &[Question],
    settings: &QuizSettings,
    rng: &mut R,
) -> Vec<LearnerQuestion> {
    let mut out: Vec<LearnerQuestion> = questions.iter().map(Question::for_learner).collect();
    if settings.randomize_questions() {
        out.as_mut_slice().shuffle(rng);
    }
    if settings.randomize_answers() {
        for question in &mut out {
            question.options.as_mut_slice().shuffle(rng);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    use lms_core::model::{
        Course, CourseId, CourseModule, LessonType, ModuleId,
    };
    use lms_core::time::fixed_now;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use storage::repository::{InMemoryRepository, ProgressRepository, Storage};

    async fn service_with(settings: QuizSettings) -> (QuizService, InMemoryRepository) {
        let repo = InMemoryRepository::new();
        repo.upsert_course(&Course::new(CourseId::new(1), "Rust", 0).unwrap())
            .await
            .unwrap();
        repo.upsert_module(
            &CourseModule::new(ModuleId::new(1), CourseId::new(1), "Basics", 0).unwrap(),
        )
        .await
        .unwrap();
        let quiz = Lesson::new(
            LessonId::new(10),
            ModuleId::new(1),
            "Quiz",
            LessonType::Quiz,
            0,
            settings,
        )
        .unwrap();
        let text = Lesson::new(
            LessonId::new(11),
            ModuleId::new(1),
            "Reading",
            LessonType::Text,
            1,
            QuizSettings::default(),
        )
        .unwrap();
        repo.upsert_lesson(&quiz).await.unwrap();
        repo.upsert_lesson(&text).await.unwrap();

        let storage = Storage::from_repository(repo.clone());
        let service = QuizService::new(
            Clock::fixed(fixed_now()),
            storage.catalog,
            storage.questions,
            storage.users,
            storage.attempts,
            storage.ledger,
        );
        (service, repo)
    }

    fn draft(correct: u32) -> QuestionDraft {
        QuestionDraft {
            text: "Which one?".into(),
            options: vec!["a".into(), "b".into(), "c".into()],
            correct_option_index: Some(correct),
            ..QuestionDraft::default()
        }
    }

    #[tokio::test]
    async fn questions_only_attach_to_quiz_lessons() {
        let (service, _) = service_with(QuizSettings::default()).await;

        let err = service
            .create_question(LessonId::new(11), draft(0))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizServiceError::NotAQuiz(_)));

        let err = service
            .create_question(LessonId::new(99), draft(0))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizServiceError::LessonNotFound(_)));

        let err = service
            .create_question(LessonId::new(10), draft(5))
            .await
            .unwrap_err();
        assert!(matches!(err, QuizServiceError::Question(_)));
    }

    #[tokio::test]
    async fn update_revalidates_merged_question() {
        let (service, _) = service_with(QuizSettings::default()).await;
        let question = service
            .create_question(LessonId::new(10), draft(2))
            .await
            .unwrap();

        let err = service
            .update_question(
                question.id(),
                QuestionPatch {
                    options: Some(vec!["only".into(), "two".into()]),
                    ..QuestionPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, QuizServiceError::Question(_)));

        let updated = service
            .update_question(
                question.id(),
                QuestionPatch {
                    text: Some("Reworded".into()),
                    ..QuestionPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.text(), "Reworded");

        service.delete_question(question.id()).await.unwrap();
        let err = service.delete_question(question.id()).await.unwrap_err();
        assert!(matches!(err, QuizServiceError::QuestionNotFound(_)));
    }

    #[tokio::test]
    async fn practice_quiz_reports_zero_attempts_and_keeps_no_rows() {
        let (service, repo) = service_with(QuizSettings::default()).await;
        let q = service
            .create_question(LessonId::new(10), draft(1))
            .await
            .unwrap();

        for _ in 0..3 {
            let result = service
                .submit(
                    UserId::new(1),
                    LessonId::new(10),
                    vec![SubmittedAnswer::single(q.id(), 0)],
                )
                .await
                .unwrap();
            assert!(result.passed);
            assert_eq!(result.attempts_taken, 0);
        }
        assert!(service
            .attempts(UserId::new(1), LessonId::new(10))
            .await
            .unwrap()
            .is_empty());

        let progress = repo
            .get_progress(UserId::new(1), LessonId::new(10))
            .await
            .unwrap()
            .unwrap();
        assert!(progress.is_completed());
        assert_eq!(progress.score(), Some(0.0));
    }

    #[tokio::test]
    async fn cap_blocks_the_submission_after_the_last_allowed_one() {
        let (service, _) = service_with(QuizSettings::new(0, 2, true).unwrap()).await;
        let q = service
            .create_question(LessonId::new(10), draft(1))
            .await
            .unwrap();
        let answers = vec![SubmittedAnswer::single(q.id(), 1)];

        let first = service
            .submit(UserId::new(1), LessonId::new(10), answers.clone())
            .await
            .unwrap();
        assert_eq!(first.attempts_taken, 1);
        let second = service
            .submit(UserId::new(1), LessonId::new(10), answers.clone())
            .await
            .unwrap();
        assert_eq!(second.attempts_taken, 2);

        let err = service
            .submit(UserId::new(1), LessonId::new(10), answers)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "maximum number of attempts (2) reached for lesson 10"
        );
    }

    #[tokio::test]
    async fn hidden_answers_strip_correct_fields_only() {
        let (service, _) = service_with(QuizSettings::new(50, 0, false).unwrap()).await;
        let q = service
            .create_question(LessonId::new(10), draft(1))
            .await
            .unwrap();

        let result = service
            .submit(
                UserId::new(1),
                LessonId::new(10),
                vec![SubmittedAnswer::single(q.id(), 1)],
            )
            .await
            .unwrap();
        assert!(!result.show_correct_answers);
        assert_eq!(result.attempts_taken, 1);

        let json = serde_json::to_value(&result).unwrap();
        let answer = &json["results"][0];
        assert_eq!(answer["selectedOptionIndex"], 1);
        assert!(answer.get("correctOptionIndex").is_none());
        assert_eq!(json["passMarkPercentage"], 50);
    }

    #[test]
    fn presentation_hides_keys_and_keeps_option_indices() {
        let questions: Vec<Question> = (1..=5)
            .map(|i| {
                draft(0)
                    .into_question(QuestionId::new(i), LessonId::new(10))
                    .unwrap()
            })
            .collect();

        let plain = present(&questions, &QuizSettings::default(), &mut StdRng::seed_from_u64(7));
        assert_eq!(
            plain.iter().map(|q| q.id.value()).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );

        let settings = QuizSettings::default().with_randomization(true, true);
        let shuffled = present(&questions, &settings, &mut StdRng::seed_from_u64(7));
        let mut ids: Vec<u64> = shuffled.iter().map(|q| q.id.value()).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        for question in &shuffled {
            let mut indices: Vec<u32> = question.options.iter().map(|o| o.index).collect();
            indices.sort_unstable();
            assert_eq!(indices, vec![0, 1, 2]);
        }
    }
}
