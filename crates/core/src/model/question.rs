use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{LessonId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question text cannot be empty")]
    EmptyText,

    #[error("a question needs at least two options, got {0}")]
    TooFewOptions(usize),

    #[error("option {0} is blank")]
    BlankOption(usize),

    #[error("correct option index {index} is out of range for {options} options")]
    IndexOutOfRange { index: u32, options: usize },

    #[error("a multi-select question needs at least one correct option index")]
    EmptyCorrectSet,

    #[error("a single-select question needs a correct option index")]
    MissingCorrectIndex,
}

//
// ─── ANSWER KEY ────────────────────────────────────────────────────────────────
//

/// Stored correct answer of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    /// Exactly one option is correct.
    Single(u32),
    /// Every option in the set must be selected, and nothing else.
    Multi(BTreeSet<u32>),
}

impl AnswerKey {
    #[must_use]
    pub fn is_multi(&self) -> bool {
        matches!(self, AnswerKey::Multi(_))
    }

    fn validate(&self, options: usize) -> Result<(), QuestionError> {
        let in_range = |index: u32| -> Result<(), QuestionError> {
            if usize::try_from(index).map_or(true, |i| i >= options) {
                return Err(QuestionError::IndexOutOfRange { index, options });
            }
            Ok(())
        };
        match self {
            AnswerKey::Single(index) => in_range(*index),
            AnswerKey::Multi(set) => {
                if set.is_empty() {
                    return Err(QuestionError::EmptyCorrectSet);
                }
                set.iter().copied().try_for_each(in_range)
            }
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A quiz question attached to one quiz lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    lesson_id: LessonId,
    text: String,
    options: Vec<String>,
    key: AnswerKey,
    order: i64,
}

impl Question {
    /// Creates a question, checking the answer key against the options.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` for blank text, fewer than two options,
    /// blank options, an empty multi-select key or an out-of-range index.
    pub fn new(
        id: QuestionId,
        lesson_id: LessonId,
        text: impl Into<String>,
        options: Vec<String>,
        key: AnswerKey,
        order: i64,
    ) -> Result<Self, QuestionError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(QuestionError::EmptyText);
        }
        if options.len() < 2 {
            return Err(QuestionError::TooFewOptions(options.len()));
        }
        if let Some(blank) = options.iter().position(|o| o.trim().is_empty()) {
            return Err(QuestionError::BlankOption(blank));
        }
        key.validate(options.len())?;

        Ok(Self {
            id,
            lesson_id,
            text,
            options,
            key,
            order,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn lesson_id(&self) -> LessonId {
        self.lesson_id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[String] {
        &self.options
    }

    #[must_use]
    pub fn key(&self) -> &AnswerKey {
        &self.key
    }

    #[must_use]
    pub fn order(&self) -> i64 {
        self.order
    }

    #[must_use]
    pub fn is_multi_select(&self) -> bool {
        self.key.is_multi()
    }

    /// Re-keys the question with a storage-assigned id.
    #[must_use]
    pub fn with_id(mut self, id: QuestionId) -> Self {
        self.id = id;
        self
    }

    /// Applies a partial update and re-validates the merged question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the merged question is invalid.
    pub fn apply_patch(&self, patch: QuestionPatch) -> Result<Self, QuestionError> {
        let mut draft = self.to_draft();
        if let Some(text) = patch.text {
            draft.text = text;
        }
        if let Some(options) = patch.options {
            draft.options = options;
        }
        if let Some(multi) = patch.multi_select {
            draft.multi_select = multi;
        }
        if let Some(index) = patch.correct_option_index {
            draft.correct_option_index = Some(index);
        }
        if let Some(indices) = patch.correct_option_indices {
            draft.correct_option_indices = Some(indices);
        }
        if let Some(order) = patch.order {
            draft.order = order;
        }
        draft.into_question(self.id, self.lesson_id)
    }

    fn to_draft(&self) -> QuestionDraft {
        let (multi_select, correct_option_index, correct_option_indices) = match &self.key {
            AnswerKey::Single(index) => (false, Some(*index), None),
            AnswerKey::Multi(set) => (true, None, Some(set.iter().copied().collect())),
        };
        QuestionDraft {
            text: self.text.clone(),
            options: self.options.clone(),
            multi_select,
            correct_option_index,
            correct_option_indices,
            order: self.order,
        }
    }

    /// Projection shown to learners: no answer key.
    ///
    /// Options keep their stored index so a shuffled presentation still
    /// submits indices the scorer understands.
    #[must_use]
    pub fn for_learner(&self) -> LearnerQuestion {
        LearnerQuestion {
            id: self.id,
            text: self.text.clone(),
            options: self
                .options
                .iter()
                .enumerate()
                .map(|(index, text)| LearnerOption {
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                    text: text.clone(),
                })
                .collect(),
            multi_select: self.is_multi_select(),
            order: self.order,
        }
    }
}

/// Administrative input for creating a question.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionDraft {
    pub text: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub multi_select: bool,
    #[serde(default)]
    pub correct_option_index: Option<u32>,
    #[serde(default)]
    pub correct_option_indices: Option<Vec<u32>>,
    #[serde(default)]
    pub order: i64,
}

impl QuestionDraft {
    /// Validates the draft into a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the draft violates any question invariant.
    pub fn into_question(
        self,
        id: QuestionId,
        lesson_id: LessonId,
    ) -> Result<Question, QuestionError> {
        let key = if self.multi_select {
            let set: BTreeSet<u32> = self
                .correct_option_indices
                .unwrap_or_default()
                .into_iter()
                .collect();
            AnswerKey::Multi(set)
        } else {
            AnswerKey::Single(
                self.correct_option_index
                    .ok_or(QuestionError::MissingCorrectIndex)?,
            )
        };
        Question::new(id, lesson_id, self.text, self.options, key, self.order)
    }
}

/// Partial update for an existing question; `None` keeps the stored value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuestionPatch {
    pub text: Option<String>,
    pub options: Option<Vec<String>>,
    pub multi_select: Option<bool>,
    pub correct_option_index: Option<u32>,
    pub correct_option_indices: Option<Vec<u32>>,
    pub order: Option<i64>,
}

/// Question as presented to a learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerQuestion {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<LearnerOption>,
    pub multi_select: bool,
    pub order: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerOption {
    pub index: u32,
    pub text: String,
}
