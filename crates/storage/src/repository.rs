use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lms_core::model::{
    Attempt, AttemptId, Course, CourseId, CourseModule, CourseTree, Lesson, LessonId, ModuleId,
    ModuleTree, Progress, Question, QuestionId, User, UserId,
};
use lms_core::rollup::CompletionCounts;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("attempt cap of {cap} reached ({taken} attempts recorded)")]
    AttemptCapReached { cap: u32, taken: u32 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── RECORDS ───────────────────────────────────────────────────────────────────
//

/// A persisted attempt together with its storage id.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRow {
    pub id: AttemptId,
    pub attempt: Attempt,
}

/// Everything a quiz submission writes, applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRecord {
    pub attempt: Attempt,
    /// Insert the attempt row. Ungraded practice quizzes skip it.
    pub persist_attempt: bool,
    /// Re-checked inside the write; `None` means unlimited.
    pub attempt_cap: Option<u32>,
}

/// Result of applying a `SubmissionRecord`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub attempt_id: Option<AttemptId>,
    /// Attempt rows for the (user, lesson) pair after the write.
    pub attempts_taken: u32,
    pub progress: Progress,
}

/// Rows removed by a scoped purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeCounts {
    pub progress_deleted: u64,
    pub attempts_deleted: u64,
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

/// Course structure: courses, modules and lessons.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the course cannot be stored.
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the module cannot be stored.
    async fn upsert_module(&self, module: &CourseModule) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the lesson cannot be stored.
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures; a missing lesson is `Ok(None)`.
    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError>;

    /// Full module/lesson tree of one course.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures; a missing course is `Ok(None)`.
    async fn course_tree(&self, id: CourseId) -> Result<Option<CourseTree>, StorageError>;

    /// Trees of every course, ordered by `(ordering, id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn course_trees(&self) -> Result<Vec<CourseTree>, StorageError>;

    /// Lesson ids under a module; empty if the module has no lessons or does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn module_lesson_ids(&self, module: ModuleId) -> Result<Vec<LessonId>, StorageError>;
}

#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Insert a new question; the id on `question` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn insert_question(&self, question: &Question) -> Result<QuestionId, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn update_question(&self, question: &Question) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the question does not exist.
    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError>;

    /// Questions of a lesson ordered by `(order, id)`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn questions_for_lesson(&self, lesson: LessonId) -> Result<Vec<Question>, StorageError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the user cannot be stored.
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError>;

    /// All users, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_users(&self) -> Result<Vec<User>, StorageError>;
}

#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn get_progress(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError>;

    /// Create-or-complete in one conditional write. An already completed
    /// record is returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails.
    async fn mark_complete(
        &self,
        user: UserId,
        lesson: LessonId,
        now: DateTime<Utc>,
    ) -> Result<Progress, StorageError>;

    /// Completed-lesson counts grouped by (user, course).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn completed_counts(&self) -> Result<CompletionCounts, StorageError>;
}

#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn count_attempts(&self, user: UserId, lesson: LessonId) -> Result<u32, StorageError>;

    /// Attempts of one learner on one lesson, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn attempts_for(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Vec<AttemptRow>, StorageError>;

    /// Attempts of every learner on one lesson, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn attempts_for_lesson(&self, lesson: LessonId) -> Result<Vec<AttemptRow>, StorageError>;

    /// Attempts of one learner across all lessons, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn attempts_for_user(&self, user: UserId) -> Result<Vec<AttemptRow>, StorageError>;
}

/// Multi-row writes over attempts and progress that must land atomically.
#[async_trait]
pub trait LedgerPersistence: Send + Sync {
    /// Check the attempt cap, insert the attempt (if requested) and upsert
    /// progress in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AttemptCapReached` if the cap is already met,
    /// or other storage errors if the write fails (nothing is applied).
    async fn record_submission(
        &self,
        submission: SubmissionRecord,
    ) -> Result<SubmissionReceipt, StorageError>;

    /// Delete all attempts of the pair and reopen its progress, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails (nothing is applied).
    async fn reset_lesson(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError>;

    /// Delete progress and attempts of `user` for every lesson in `lessons`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the write fails (nothing is applied).
    async fn purge_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<PurgeCounts, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct CatalogState {
    courses: HashMap<CourseId, Course>,
    modules: HashMap<ModuleId, CourseModule>,
    lessons: HashMap<LessonId, Lesson>,
}

impl CatalogState {
    fn tree(&self, course: &Course) -> Result<CourseTree, StorageError> {
        let modules = self
            .modules
            .values()
            .filter(|m| m.course_id() == course.id())
            .map(|m| ModuleTree {
                module: m.clone(),
                lessons: self
                    .lessons
                    .values()
                    .filter(|l| l.module_id() == m.id())
                    .cloned()
                    .collect(),
            })
            .collect();
        CourseTree::new(course.clone(), modules)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

#[derive(Default)]
struct QuestionState {
    questions: BTreeMap<QuestionId, Question>,
    next_id: u64,
}

/// Attempts and progress share one lock so composite writes are atomic.
#[derive(Default)]
struct LedgerState {
    progress: HashMap<(UserId, LessonId), Progress>,
    attempts: Vec<AttemptRow>,
    next_attempt_id: u64,
}

impl LedgerState {
    fn count(&self, user: UserId, lesson: LessonId) -> usize {
        self.attempts
            .iter()
            .filter(|row| row.attempt.user_id() == user && row.attempt.lesson_id() == lesson)
            .count()
    }

    fn newest_first(&self, keep: impl Fn(&Attempt) -> bool) -> Vec<AttemptRow> {
        let mut rows: Vec<AttemptRow> = self
            .attempts
            .iter()
            .filter(|row| keep(&row.attempt))
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.attempt
                .created_at()
                .cmp(&a.attempt.created_at())
                .then(b.id.cmp(&a.id))
        });
        rows
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|e| StorageError::Connection(e.to_string()))
}

fn count_u32(n: usize) -> Result<u32, StorageError> {
    u32::try_from(n).map_err(|_| StorageError::Serialization(format!("count overflow: {n}")))
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    catalog: Arc<Mutex<CatalogState>>,
    questions: Arc<Mutex<QuestionState>>,
    users: Arc<Mutex<HashMap<UserId, User>>>,
    ledger: Arc<Mutex<LedgerState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_course(&self, course: &Course) -> Result<(), StorageError> {
        lock(&self.catalog)?
            .courses
            .insert(course.id(), course.clone());
        Ok(())
    }

    async fn upsert_module(&self, module: &CourseModule) -> Result<(), StorageError> {
        let mut guard = lock(&self.catalog)?;
        if !guard.courses.contains_key(&module.course_id()) {
            return Err(StorageError::Conflict);
        }
        guard.modules.insert(module.id(), module.clone());
        Ok(())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<(), StorageError> {
        let mut guard = lock(&self.catalog)?;
        if !guard.modules.contains_key(&lesson.module_id()) {
            return Err(StorageError::Conflict);
        }
        guard.lessons.insert(lesson.id(), lesson.clone());
        Ok(())
    }

    async fn get_lesson(&self, id: LessonId) -> Result<Option<Lesson>, StorageError> {
        Ok(lock(&self.catalog)?.lessons.get(&id).cloned())
    }

    async fn course_tree(&self, id: CourseId) -> Result<Option<CourseTree>, StorageError> {
        let guard = lock(&self.catalog)?;
        guard.courses.get(&id).map(|c| guard.tree(c)).transpose()
    }

    async fn course_trees(&self) -> Result<Vec<CourseTree>, StorageError> {
        let guard = lock(&self.catalog)?;
        let mut courses: Vec<&Course> = guard.courses.values().collect();
        courses.sort_by_key(|c| (c.ordering(), c.id()));
        courses.into_iter().map(|c| guard.tree(c)).collect()
    }

    async fn module_lesson_ids(&self, module: ModuleId) -> Result<Vec<LessonId>, StorageError> {
        let guard = lock(&self.catalog)?;
        let mut lessons: Vec<&Lesson> = guard
            .lessons
            .values()
            .filter(|l| l.module_id() == module)
            .collect();
        lessons.sort_by_key(|l| (l.order(), l.id()));
        Ok(lessons.into_iter().map(Lesson::id).collect())
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn insert_question(&self, question: &Question) -> Result<QuestionId, StorageError> {
        let mut guard = lock(&self.questions)?;
        guard.next_id += 1;
        let id = QuestionId::new(guard.next_id);
        guard.questions.insert(id, question.clone().with_id(id));
        Ok(id)
    }

    async fn update_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = lock(&self.questions)?;
        let slot = guard
            .questions
            .get_mut(&question.id())
            .ok_or(StorageError::NotFound)?;
        *slot = question.clone();
        Ok(())
    }

    async fn delete_question(&self, id: QuestionId) -> Result<(), StorageError> {
        lock(&self.questions)?
            .questions
            .remove(&id)
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    async fn get_question(&self, id: QuestionId) -> Result<Option<Question>, StorageError> {
        Ok(lock(&self.questions)?.questions.get(&id).cloned())
    }

    async fn questions_for_lesson(&self, lesson: LessonId) -> Result<Vec<Question>, StorageError> {
        let guard = lock(&self.questions)?;
        let mut out: Vec<Question> = guard
            .questions
            .values()
            .filter(|q| q.lesson_id() == lesson)
            .cloned()
            .collect();
        out.sort_by_key(|q| (q.order(), q.id()));
        Ok(out)
    }
}

#[async_trait]
impl UserRepository for InMemoryRepository {
    async fn upsert_user(&self, user: &User) -> Result<(), StorageError> {
        lock(&self.users)?.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, StorageError> {
        Ok(lock(&self.users)?.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let mut users: Vec<User> = lock(&self.users)?.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError> {
        Ok(lock(&self.ledger)?.progress.get(&(user, lesson)).cloned())
    }

    async fn progress_for_user(&self, user: UserId) -> Result<Vec<Progress>, StorageError> {
        let guard = lock(&self.ledger)?;
        let mut out: Vec<Progress> = guard
            .progress
            .values()
            .filter(|p| p.user_id() == user)
            .cloned()
            .collect();
        out.sort_by_key(Progress::lesson_id);
        Ok(out)
    }

    async fn mark_complete(
        &self,
        user: UserId,
        lesson: LessonId,
        now: DateTime<Utc>,
    ) -> Result<Progress, StorageError> {
        let mut guard = lock(&self.ledger)?;
        let progress = guard
            .progress
            .entry((user, lesson))
            .or_insert_with(|| Progress::new(user, lesson));
        progress.mark_complete(now);
        Ok(progress.clone())
    }

    async fn completed_counts(&self) -> Result<CompletionCounts, StorageError> {
        let catalog = lock(&self.catalog)?;
        let ledger = lock(&self.ledger)?;
        let mut counts = CompletionCounts::new();
        for progress in ledger.progress.values().filter(|p| p.is_completed()) {
            let course = catalog
                .lessons
                .get(&progress.lesson_id())
                .and_then(|l| catalog.modules.get(&l.module_id()))
                .map(CourseModule::course_id);
            if let Some(course) = course {
                *counts.entry((progress.user_id(), course)).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn count_attempts(&self, user: UserId, lesson: LessonId) -> Result<u32, StorageError> {
        count_u32(lock(&self.ledger)?.count(user, lesson))
    }

    async fn attempts_for(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Vec<AttemptRow>, StorageError> {
        Ok(lock(&self.ledger)?
            .newest_first(|a| a.user_id() == user && a.lesson_id() == lesson))
    }

    async fn attempts_for_lesson(&self, lesson: LessonId) -> Result<Vec<AttemptRow>, StorageError> {
        Ok(lock(&self.ledger)?.newest_first(|a| a.lesson_id() == lesson))
    }

    async fn attempts_for_user(&self, user: UserId) -> Result<Vec<AttemptRow>, StorageError> {
        Ok(lock(&self.ledger)?.newest_first(|a| a.user_id() == user))
    }
}

#[async_trait]
impl LedgerPersistence for InMemoryRepository {
    async fn record_submission(
        &self,
        submission: SubmissionRecord,
    ) -> Result<SubmissionReceipt, StorageError> {
        let mut guard = lock(&self.ledger)?;
        let user = submission.attempt.user_id();
        let lesson = submission.attempt.lesson_id();

        let existing = count_u32(guard.count(user, lesson))?;
        if let Some(cap) = submission.attempt_cap {
            if existing >= cap {
                return Err(StorageError::AttemptCapReached {
                    cap,
                    taken: existing,
                });
            }
        }

        let attempt_id = if submission.persist_attempt {
            guard.next_attempt_id += 1;
            let id = AttemptId::new(guard.next_attempt_id);
            guard.attempts.push(AttemptRow {
                id,
                attempt: submission.attempt.clone(),
            });
            Some(id)
        } else {
            None
        };

        let attempt = &submission.attempt;
        let progress = guard
            .progress
            .entry((user, lesson))
            .or_insert_with(|| Progress::new(user, lesson));
        progress.record_quiz(attempt.score(), attempt.passed(), attempt.created_at());
        let progress = progress.clone();

        Ok(SubmissionReceipt {
            attempt_id,
            attempts_taken: existing + u32::from(attempt_id.is_some()),
            progress,
        })
    }

    async fn reset_lesson(
        &self,
        user: UserId,
        lesson: LessonId,
    ) -> Result<Option<Progress>, StorageError> {
        let mut guard = lock(&self.ledger)?;
        guard
            .attempts
            .retain(|row| !(row.attempt.user_id() == user && row.attempt.lesson_id() == lesson));
        Ok(guard.progress.get_mut(&(user, lesson)).map(|progress| {
            progress.reopen();
            progress.clone()
        }))
    }

    async fn purge_lessons(
        &self,
        user: UserId,
        lessons: &[LessonId],
    ) -> Result<PurgeCounts, StorageError> {
        if lessons.is_empty() {
            return Ok(PurgeCounts::default());
        }
        let scope: HashSet<LessonId> = lessons.iter().copied().collect();
        let mut guard = lock(&self.ledger)?;

        let before = guard.progress.len();
        guard
            .progress
            .retain(|(u, l), _| !(*u == user && scope.contains(l)));
        let progress_deleted = before - guard.progress.len();

        let before = guard.attempts.len();
        guard.attempts.retain(|row| {
            !(row.attempt.user_id() == user && scope.contains(&row.attempt.lesson_id()))
        });
        let attempts_deleted = before - guard.attempts.len();

        Ok(PurgeCounts {
            progress_deleted: progress_deleted as u64,
            attempts_deleted: attempts_deleted as u64,
        })
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Bundles every repository behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub questions: Arc<dyn QuestionRepository>,
    pub users: Arc<dyn UserRepository>,
    pub progress: Arc<dyn ProgressRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub ledger: Arc<dyn LedgerPersistence>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_repository(InMemoryRepository::new())
    }

    /// Wire every contract to one repository value.
    #[must_use]
    pub fn from_repository<R>(repo: R) -> Self
    where
        R: CatalogRepository
            + QuestionRepository
            + UserRepository
            + ProgressRepository
            + AttemptRepository
            + LedgerPersistence
            + Clone
            + 'static,
    {
        Self {
            catalog: Arc::new(repo.clone()),
            questions: Arc::new(repo.clone()),
            users: Arc::new(repo.clone()),
            progress: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            ledger: Arc::new(repo),
        }
    }
}
