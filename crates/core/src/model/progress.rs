use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{LessonId, UserId};

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("completed progress must carry a completion timestamp")]
    MissingCompletedAt,

    #[error("incomplete progress cannot carry a completion timestamp")]
    UnexpectedCompletedAt,

    #[error("progress score must be within [0, 1], got {0}")]
    ScoreOutOfRange(f64),
}

/// Completion marker for one (user, lesson) pair.
///
/// Invariant: `completed` implies `completed_at` is set, and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    user_id: UserId,
    lesson_id: LessonId,
    completed: bool,
    score: Option<f64>,
    completed_at: Option<DateTime<Utc>>,
}

impl Progress {
    /// Fresh, incomplete progress with no score.
    #[must_use]
    pub fn new(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            user_id,
            lesson_id,
            completed: false,
            score: None,
            completed_at: None,
        }
    }

    /// Rehydrate progress from storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the completion flag and timestamp disagree
    /// or the score is not a fraction.
    pub fn from_persisted(
        user_id: UserId,
        lesson_id: LessonId,
        completed: bool,
        score: Option<f64>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<Self, ProgressError> {
        match (completed, completed_at) {
            (true, None) => return Err(ProgressError::MissingCompletedAt),
            (false, Some(_)) => return Err(ProgressError::UnexpectedCompletedAt),
            _ => {}
        }
        if let Some(s) = score {
            if !s.is_finite() || !(0.0..=1.0).contains(&s) {
                return Err(ProgressError::ScoreOutOfRange(s));
            }
        }
        Ok(Self {
            user_id,
            lesson_id,
            completed,
            score,
            completed_at,
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
    pub fn is_completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn score(&self) -> Option<f64> {
        self.score
    }

    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Marks the lesson complete. Returns `false` when it already was;
    /// the original timestamp is kept.
    pub fn mark_complete(&mut self, now: DateTime<Utc>) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.completed_at = Some(now);
        true
    }

    /// Applies a quiz outcome.
    ///
    /// The score always tracks the latest attempt. Completion only ever moves
    /// from incomplete to complete, on a pass.
    pub fn record_quiz(&mut self, score: f64, passed: bool, now: DateTime<Utc>) {
        self.score = Some(score);
        if passed {
            self.mark_complete(now);
        }
    }

    /// Clears completion and score so the lesson can be retaken.
    pub fn reopen(&mut self) {
        self.completed = false;
        self.score = None;
        self.completed_at = None;
    }
}
