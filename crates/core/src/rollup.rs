//! Rollup of lesson-level progress into module and course reports.
//!
//! Everything here is pure: callers fetch the course tree, progress rows and
//! attempt history, and these functions fold them into serializable reports.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{
    Attempt, CourseId, CourseTree, Lesson, LessonId, LessonType, ModuleId, Progress, User, UserId,
};

/// `round(completed / total * 100)`, or 0 for an empty scope.
#[must_use]
pub fn progress_percentage(completed: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    #[allow(clippy::cast_precision_loss)]
    let ratio = completed as f64 / total as f64;
    crate::scoring::percentage(ratio)
}

//
// ─── ATTEMPT FOLD ──────────────────────────────────────────────────────────────
//

/// Attempt history folded to count, best score and whether any attempt passed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptFold {
    pub attempt_count: u32,
    pub best_score: Option<f64>,
    pub passed: bool,
}

impl AttemptFold {
    pub fn push(&mut self, score: f64, passed: bool) {
        self.attempt_count = self.attempt_count.saturating_add(1);
        self.best_score = Some(self.best_score.map_or(score, |best| best.max(score)));
        self.passed |= passed;
    }

    /// Folds attempts per lesson.
    pub fn by_lesson<'a>(
        attempts: impl IntoIterator<Item = &'a Attempt>,
    ) -> HashMap<LessonId, AttemptFold> {
        let mut out: HashMap<LessonId, AttemptFold> = HashMap::new();
        for attempt in attempts {
            out.entry(attempt.lesson_id())
                .or_default()
                .push(attempt.score(), attempt.passed());
        }
        out
    }

    /// Folds attempts per user, keeping first-seen user order.
    pub fn by_user<'a>(
        attempts: impl IntoIterator<Item = &'a Attempt>,
    ) -> Vec<(UserId, AttemptFold)> {
        let mut order: Vec<UserId> = Vec::new();
        let mut folds: HashMap<UserId, AttemptFold> = HashMap::new();
        for attempt in attempts {
            let fold = folds.entry(attempt.user_id()).or_insert_with(|| {
                order.push(attempt.user_id());
                AttemptFold::default()
            });
            fold.push(attempt.score(), attempt.passed());
        }
        order
            .into_iter()
            .map(|user| (user, folds.remove(&user).unwrap_or_default()))
            .collect()
    }
}

//
// ─── REPORTS ───────────────────────────────────────────────────────────────────
//

/// Quiz-specific detail for one quiz lesson.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizDetail {
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub pass_mark_percentage: u32,
    pub best_score: Option<f64>,
    pub passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressReport {
    pub lesson_id: LessonId,
    pub lesson_title: String,
    pub lesson_type: LessonType,
    pub completed: bool,
    pub score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub pass_mark_percentage: u32,
    pub quiz: Option<QuizDetail>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgressReport {
    pub module_id: ModuleId,
    pub module_title: String,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub lessons: Vec<LessonProgressReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressReport {
    pub course_id: CourseId,
    pub course_title: String,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub progress_percentage: u32,
    pub modules: Vec<ModuleProgressReport>,
}

/// Learner-facing course rollup: completion, score and pass mark per lesson.
///
/// Score and completion time only come from completed lessons.
#[must_use]
pub fn course_report(
    tree: &CourseTree,
    progress: &HashMap<LessonId, Progress>,
) -> CourseProgressReport {
    build_report(tree, progress, true, |_| None)
}

/// Administrative rollup: the course report plus attempt detail on quiz lessons.
///
/// Incomplete lessons still show their latest score.
#[must_use]
pub fn detailed_course_report(
    tree: &CourseTree,
    progress: &HashMap<LessonId, Progress>,
    attempts: &HashMap<LessonId, AttemptFold>,
) -> CourseProgressReport {
    build_report(tree, progress, false, |lesson| {
        lesson.is_quiz().then(|| {
            let fold = attempts.get(&lesson.id()).copied().unwrap_or_default();
            QuizDetail {
                attempt_count: fold.attempt_count,
                max_attempts: lesson.quiz().max_attempts(),
                pass_mark_percentage: lesson.quiz().pass_mark_percentage(),
                best_score: fold.best_score,
                passed: fold.passed,
            }
        })
    })
}

fn build_report(
    tree: &CourseTree,
    progress: &HashMap<LessonId, Progress>,
    completed_only: bool,
    quiz_detail: impl Fn(&Lesson) -> Option<QuizDetail>,
) -> CourseProgressReport {
    let mut total_lessons = 0;
    let mut completed_lessons = 0;

    let modules = tree
        .modules()
        .iter()
        .map(|module| {
            let lessons: Vec<LessonProgressReport> = module
                .lessons
                .iter()
                .map(|lesson| {
                    let record = progress.get(&lesson.id());
                    let shown = record.filter(|p| !completed_only || p.is_completed());
                    LessonProgressReport {
                        lesson_id: lesson.id(),
                        lesson_title: lesson.title().to_owned(),
                        lesson_type: lesson.lesson_type(),
                        completed: record.is_some_and(Progress::is_completed),
                        score: shown.and_then(Progress::score),
                        completed_at: shown.and_then(Progress::completed_at),
                        pass_mark_percentage: lesson.pass_mark_context(),
                        quiz: quiz_detail(lesson),
                    }
                })
                .collect();

            let module_completed = lessons.iter().filter(|l| l.completed).count();
            total_lessons += lessons.len();
            completed_lessons += module_completed;

            ModuleProgressReport {
                module_id: module.module.id(),
                module_title: module.module.title().to_owned(),
                total_lessons: lessons.len(),
                completed_lessons: module_completed,
                lessons,
            }
        })
        .collect();

    CourseProgressReport {
        course_id: tree.course().id(),
        course_title: tree.course().title().to_owned(),
        total_lessons,
        completed_lessons,
        progress_percentage: progress_percentage(completed_lessons, total_lessons),
        modules,
    }
}

//
// ─── ADMIN OVERVIEW ────────────────────────────────────────────────────────────
//

/// Completed-lesson counts keyed by (user, course), as produced by one grouped query.
pub type CompletionCounts = HashMap<(UserId, CourseId), usize>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseCompletion {
    pub course_id: CourseId,
    pub course_title: String,
    pub total_lessons: usize,
    pub completed_lessons: usize,
    pub progress_percentage: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOverview {
    pub user_id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub courses: Vec<CourseCompletion>,
}

/// One row per user with a completion figure for every course.
#[must_use]
pub fn admin_overview(
    users: &[User],
    courses: &[CourseTree],
    counts: &CompletionCounts,
) -> Vec<UserOverview> {
    users
        .iter()
        .map(|user| UserOverview {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            created_at: user.created_at,
            courses: courses
                .iter()
                .map(|tree| {
                    let total_lessons = tree.lesson_count();
                    let completed_lessons = counts
                        .get(&(user.id, tree.course().id()))
                        .copied()
                        .unwrap_or(0)
                        .min(total_lessons);
                    CourseCompletion {
                        course_id: tree.course().id(),
                        course_title: tree.course().title().to_owned(),
                        total_lessons,
                        completed_lessons,
                        progress_percentage: progress_percentage(completed_lessons, total_lessons),
                    }
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Course, CourseModule, ModuleTree, QuizSettings};
    use crate::time::fixed_now;

    fn lesson(id: u64, module: u64, kind: LessonType) -> Lesson {
        Lesson::new(
            LessonId::new(id),
            ModuleId::new(module),
            format!("L{id}"),
            kind,
            i64::try_from(id).unwrap(),
            QuizSettings::new(60, 3, true).unwrap(),
        )
        .unwrap()
    }

    fn tree() -> CourseTree {
        let course = Course::new(CourseId::new(1), "Rust", 0).unwrap();
        CourseTree::new(
            course,
            vec![
                ModuleTree {
                    module: CourseModule::new(ModuleId::new(1), CourseId::new(1), "Basics", 0)
                        .unwrap(),
                    lessons: vec![
                        lesson(1, 1, LessonType::Video),
                        lesson(2, 1, LessonType::Text),
                    ],
                },
                ModuleTree {
                    module: CourseModule::new(ModuleId::new(2), CourseId::new(1), "Check", 1)
                        .unwrap(),
                    lessons: vec![lesson(3, 2, LessonType::Pdf), lesson(4, 2, LessonType::Quiz)],
                },
            ],
        )
        .unwrap()
    }

    fn done(lesson: u64) -> (LessonId, Progress) {
        let mut p = Progress::new(UserId::new(1), LessonId::new(lesson));
        p.mark_complete(fixed_now());
        (LessonId::new(lesson), p)
    }

    #[test]
    fn three_of_four_is_seventy_five_percent() {
        let progress: HashMap<_, _> = [done(1), done(2), done(3)].into_iter().collect();
        let report = course_report(&tree(), &progress);

        assert_eq!(report.total_lessons, 4);
        assert_eq!(report.completed_lessons, 3);
        assert_eq!(report.progress_percentage, 75);
        assert_eq!(report.modules[0].completed_lessons, 2);
        assert_eq!(report.modules[1].completed_lessons, 1);
        assert_eq!(report.modules[1].lessons[1].pass_mark_percentage, 60);
        assert_eq!(report.modules[0].lessons[0].pass_mark_percentage, 0);
        assert!(report.modules[1].lessons[1].quiz.is_none());
    }

    #[test]
    fn empty_course_reports_zero_percent() {
        let course = Course::new(CourseId::new(2), "Empty", 0).unwrap();
        let empty = CourseTree::new(course, Vec::new()).unwrap();
        let report = course_report(&empty, &HashMap::new());
        assert_eq!(report.progress_percentage, 0);
        assert!(report.modules.is_empty());
    }

    #[test]
    fn incomplete_score_only_in_detailed_report() {
        let mut p = Progress::new(UserId::new(1), LessonId::new(4));
        p.record_quiz(0.25, false, fixed_now());
        let progress: HashMap<_, _> = [(LessonId::new(4), p)].into_iter().collect();

        let report = course_report(&tree(), &progress);
        let quiz = &report.modules[1].lessons[1];
        assert!(!quiz.completed);
        assert_eq!(quiz.score, None);
        assert_eq!(quiz.completed_at, None);
        assert_eq!(report.completed_lessons, 0);

        let detailed = detailed_course_report(&tree(), &progress, &HashMap::new());
        let quiz = &detailed.modules[1].lessons[1];
        assert!(!quiz.completed);
        assert_eq!(quiz.score, Some(0.25));
    }

    #[test]
    fn completed_quiz_shows_score_in_learner_report() {
        let mut p = Progress::new(UserId::new(1), LessonId::new(4));
        p.record_quiz(0.75, true, fixed_now());
        let progress: HashMap<_, _> = [(LessonId::new(4), p)].into_iter().collect();

        let report = course_report(&tree(), &progress);
        let quiz = &report.modules[1].lessons[1];
        assert!(quiz.completed);
        assert_eq!(quiz.score, Some(0.75));
        assert_eq!(quiz.completed_at, Some(fixed_now()));
    }

    #[test]
    fn detailed_report_embeds_attempt_fold_on_quizzes_only() {
        let attempts = vec![
            Attempt::new(UserId::new(1), LessonId::new(4), 0.4, false, vec![], fixed_now())
                .unwrap(),
            Attempt::new(UserId::new(1), LessonId::new(4), 0.8, true, vec![], fixed_now())
                .unwrap(),
        ];
        let folds = AttemptFold::by_lesson(&attempts);
        let report = detailed_course_report(&tree(), &HashMap::new(), &folds);

        let quiz = report.modules[1].lessons[1].quiz.as_ref().unwrap();
        assert_eq!(quiz.attempt_count, 2);
        assert_eq!(quiz.best_score, Some(0.8));
        assert!(quiz.passed);
        assert_eq!(quiz.max_attempts, 3);
        assert!(report.modules[0].lessons[0].quiz.is_none());
    }

    #[test]
    fn unattempted_quiz_has_no_best_score() {
        let report = detailed_course_report(&tree(), &HashMap::new(), &HashMap::new());
        let quiz = report.modules[1].lessons[1].quiz.as_ref().unwrap();
        assert_eq!(quiz.attempt_count, 0);
        assert_eq!(quiz.best_score, None);
        assert!(!quiz.passed);
    }

    #[test]
    fn fold_by_user_keeps_first_seen_order() {
        let attempts = vec![
            Attempt::new(UserId::new(2), LessonId::new(4), 0.5, false, vec![], fixed_now())
                .unwrap(),
            Attempt::new(UserId::new(1), LessonId::new(4), 1.0, true, vec![], fixed_now())
                .unwrap(),
            Attempt::new(UserId::new(2), LessonId::new(4), 0.7, true, vec![], fixed_now())
                .unwrap(),
        ];
        let folds = AttemptFold::by_user(&attempts);
        assert_eq!(folds.len(), 2);
        assert_eq!(folds[0].0, UserId::new(2));
        assert_eq!(folds[0].1.attempt_count, 2);
        assert_eq!(folds[0].1.best_score, Some(0.7));
        assert!(folds[0].1.passed);
    }

    #[test]
    fn overview_uses_grouped_counts() {
        let users = vec![
            User::new(UserId::new(1), "a@example.com", "Ada", "L", fixed_now()),
            User::new(UserId::new(2), "b@example.com", "Bob", "K", fixed_now()),
        ];
        let counts: CompletionCounts = [((UserId::new(1), CourseId::new(1)), 2)]
            .into_iter()
            .collect();
        let rows = admin_overview(&users, &[tree()], &counts);

        assert_eq!(rows[0].courses[0].progress_percentage, 50);
        assert_eq!(rows[1].courses[0].completed_lessons, 0);
        assert_eq!(rows[1].courses[0].progress_percentage, 0);
    }

    #[test]
    fn percentage_of_empty_scope_is_zero() {
        assert_eq!(progress_percentage(0, 0), 0);
        assert_eq!(progress_percentage(1, 3), 33);
        assert_eq!(progress_percentage(2, 3), 67);
    }
}
