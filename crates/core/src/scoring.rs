//! Quiz scoring: pure grading of submitted answers against a lesson's questions.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::model::{AnswerKey, GradedAnswer, Question, QuestionId, RedactedAnswer, SubmittedAnswer};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoringError {
    #[error("this quiz has no questions")]
    NoQuestions,

    #[error("question {0} does not belong to this quiz")]
    UnknownQuestion(QuestionId),

    #[error("question {0} was answered more than once")]
    DuplicateAnswer(QuestionId),
}

//
// ─── SCORECARD ─────────────────────────────────────────────────────────────────
//

/// Outcome of grading one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Scorecard {
    pub total_questions: usize,
    pub correct_answers: usize,
    /// Fraction of the lesson's questions answered correctly, in `[0, 1]`.
    pub score: f64,
    /// `score` as a whole percentage, rounded half up.
    pub score_percentage: u32,
    pub passed: bool,
    pub answers: Vec<GradedAnswer>,
}

impl Scorecard {
    /// Per-answer feedback, with correct answers hidden unless `show_correct_answers`.
    #[must_use]
    pub fn feedback(&self, show_correct_answers: bool) -> Vec<AnswerFeedback> {
        self.answers
            .iter()
            .map(|answer| {
                if show_correct_answers {
                    AnswerFeedback::Full(answer.clone())
                } else {
                    AnswerFeedback::Redacted(answer.redacted())
                }
            })
            .collect()
    }
}

/// One graded answer as echoed back to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AnswerFeedback {
    Full(GradedAnswer),
    Redacted(RedactedAnswer),
}

//
// ─── GRADING ───────────────────────────────────────────────────────────────────
//

/// Rounds a fractional score to a whole percentage (half up).
#[must_use]
pub fn percentage(score: f64) -> u32 {
    let pct = (score * 100.0).round().clamp(0.0, 100.0);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pct = pct as u32;
    pct
}

/// Pass rule: a zero pass mark always passes.
#[must_use]
pub fn passes(score_percentage: u32, pass_mark_percentage: u32) -> bool {
    pass_mark_percentage == 0 || score_percentage >= pass_mark_percentage
}

/// Grades `answers` against the lesson's `questions`.
///
/// Questions without an answer count as incorrect. The score denominator is
/// the number of questions in the lesson, not the number of answers.
///
/// # Errors
///
/// - `ScoringError::NoQuestions` if the lesson has no questions.
/// - `ScoringError::UnknownQuestion` if an answer names a foreign question.
/// - `ScoringError::DuplicateAnswer` if a question is answered twice.
pub fn grade(
    questions: &[Question],
    answers: &[SubmittedAnswer],
    pass_mark_percentage: u32,
) -> Result<Scorecard, ScoringError> {
    if questions.is_empty() {
        return Err(ScoringError::NoQuestions);
    }

    let by_id: HashMap<QuestionId, &Question> = questions.iter().map(|q| (q.id(), q)).collect();
    let mut seen = HashSet::with_capacity(answers.len());
    let mut graded = Vec::with_capacity(answers.len());

    for answer in answers {
        let question = by_id
            .get(&answer.question_id)
            .ok_or(ScoringError::UnknownQuestion(answer.question_id))?;
        if !seen.insert(answer.question_id) {
            return Err(ScoringError::DuplicateAnswer(answer.question_id));
        }
        graded.push(grade_answer(question, answer));
    }

    let correct_answers = graded.iter().filter(|g| g.is_correct).count();
    let total_questions = questions.len();

    #[allow(clippy::cast_precision_loss)]
    let score = correct_answers as f64 / total_questions as f64;
    let score_percentage = percentage(score);

    Ok(Scorecard {
        total_questions,
        correct_answers,
        score,
        score_percentage,
        passed: passes(score_percentage, pass_mark_percentage),
        answers: graded,
    })
}

fn grade_answer(question: &Question, answer: &SubmittedAnswer) -> GradedAnswer {
    let (is_correct, correct_option_index, correct_option_indices) = match question.key() {
        AnswerKey::Single(expected) => (
            answer.selected_option_index == Some(*expected),
            Some(*expected),
            None,
        ),
        AnswerKey::Multi(expected) => {
            let selected: BTreeSet<u32> = answer
                .selected_option_indices
                .iter()
                .flatten()
                .copied()
                .collect();
            (
                &selected == expected,
                None,
                Some(expected.iter().copied().collect()),
            )
        }
    };

    GradedAnswer {
        question_id: answer.question_id,
        selected_option_index: answer.selected_option_index,
        selected_option_indices: answer.selected_option_indices.clone(),
        correct_option_index,
        correct_option_indices,
        multi_select: question.is_multi_select(),
        is_correct,
    }
}
