use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{AttemptId, LessonId, QuestionId, UserId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt score must be within [0, 1], got {0}")]
    ScoreOutOfRange(f64),
}

/// One learner answer as submitted.
///
/// Single-select questions read `selected_option_index`, multi-select
/// questions read `selected_option_indices`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: QuestionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option_indices: Option<Vec<u32>>,
}

impl SubmittedAnswer {
    #[must_use]
    pub fn single(question_id: QuestionId, index: u32) -> Self {
        Self {
            question_id,
            selected_option_index: Some(index),
            selected_option_indices: None,
        }
    }

    #[must_use]
    pub fn multi(question_id: QuestionId, indices: impl IntoIterator<Item = u32>) -> Self {
        Self {
            question_id,
            selected_option_index: None,
            selected_option_indices: Some(indices.into_iter().collect()),
        }
    }
}

/// Per-question verdict frozen at submission time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: QuestionId,
    pub selected_option_index: Option<u32>,
    pub selected_option_indices: Option<Vec<u32>>,
    pub correct_option_index: Option<u32>,
    pub correct_option_indices: Option<Vec<u32>>,
    pub multi_select: bool,
    pub is_correct: bool,
}

impl GradedAnswer {
    /// Same answer with the correct-answer fields and the verdict removed.
    #[must_use]
    pub fn redacted(&self) -> RedactedAnswer {
        RedactedAnswer {
            question_id: self.question_id,
            selected_option_index: self.selected_option_index,
            selected_option_indices: self.selected_option_indices.clone(),
            multi_select: self.multi_select,
        }
    }
}

/// Graded answer as echoed when a lesson hides correct answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedactedAnswer {
    pub question_id: QuestionId,
    pub selected_option_index: Option<u32>,
    pub selected_option_indices: Option<Vec<u32>>,
    pub multi_select: bool,
}

/// Immutable record of one scored quiz submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    user_id: UserId,
    lesson_id: LessonId,
    score: f64,
    passed: bool,
    answers: Vec<GradedAnswer>,
    created_at: DateTime<Utc>,
}

impl Attempt {
    /// # Errors
    ///
    /// Returns `AttemptError::ScoreOutOfRange` if `score` is not within `[0, 1]`.
    pub fn new(
        user_id: UserId,
        lesson_id: LessonId,
        score: f64,
        passed: bool,
        answers: Vec<GradedAnswer>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, AttemptError> {
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(AttemptError::ScoreOutOfRange(score));
        }
        Ok(Self {
            user_id,
            lesson_id,
            score,
            passed,
            answers,
            created_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn score(&self) -> f64 {
        self.score
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    #[must_use]
    pub fn answers(&self) -> &[GradedAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Attempt history entry without the per-question detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptSummary {
    pub id: AttemptId,
    pub score: f64,
    pub passed: bool,
    pub created_at: DateTime<Utc>,
}
