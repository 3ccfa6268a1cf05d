use std::path::Path;

use lms_core::model::{
    Course, CourseId, CourseModule, Lesson, LessonId, LessonType, ModuleId, QuestionDraft,
    QuestionId, QuizSettings, SubmittedAnswer, User, UserId,
};
use lms_core::time::fixed_now;
use services::{AppServices, Clock, ErrorKind};
use storage::repository::Storage;
use tokio::task::JoinSet;

const MODULE: ModuleId = ModuleId::new(1);
const CAPPED_QUIZ: LessonId = LessonId::new(1);
const SINGLE_TRY_QUIZ: LessonId = LessonId::new(2);
const OPEN_QUIZ: LessonId = LessonId::new(3);

/// File-backed store so submissions run on separate pooled connections.
async fn file_storage(dir: &Path, learners: u64) -> Storage {
    let url = format!("sqlite://{}?mode=rwc", dir.join("lms.sqlite3").display());
    let storage = Storage::sqlite(&url).await.expect("open sqlite file");

    storage
        .catalog
        .upsert_course(&Course::new(CourseId::new(1), "Concurrency", 0).unwrap())
        .await
        .unwrap();
    storage
        .catalog
        .upsert_module(&CourseModule::new(MODULE, CourseId::new(1), "Quizzes", 0).unwrap())
        .await
        .unwrap();

    let lessons = [
        (CAPPED_QUIZ, QuizSettings::new(60, 5, true).unwrap()),
        (SINGLE_TRY_QUIZ, QuizSettings::new(60, 1, true).unwrap()),
        (OPEN_QUIZ, QuizSettings::new(50, 0, true).unwrap()),
    ];
    for (order, (id, quiz)) in (0_i64..).zip(lessons) {
        storage
            .catalog
            .upsert_lesson(
                &Lesson::new(id, MODULE, format!("Quiz {id}"), LessonType::Quiz, order, quiz)
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    for id in 1..=learners {
        storage
            .users
            .upsert_user(&User::new(
                UserId::new(id),
                format!("learner{id}@example.com"),
                "Learner",
                id.to_string(),
                fixed_now(),
            ))
            .await
            .unwrap();
    }
    storage
}

async fn add_question(app: &AppServices, lesson: LessonId) -> QuestionId {
    app.quiz()
        .create_question(
            lesson,
            QuestionDraft {
                text: "Pick the second option".into(),
                options: vec!["first".into(), "second".into()],
                correct_option_index: Some(1),
                ..QuestionDraft::default()
            },
        )
        .await
        .unwrap()
        .id()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn overlapping_submissions_from_distinct_learners_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let storage = file_storage(dir.path(), 40).await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let question = add_question(&app, CAPPED_QUIZ).await;

    let mut tasks = JoinSet::new();
    for id in 1..=40 {
        let quiz = app.quiz();
        tasks.spawn(async move {
            quiz.submit(
                UserId::new(id),
                CAPPED_QUIZ,
                vec![SubmittedAnswer::single(question, 1)],
            )
            .await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap().unwrap();
        assert!(result.passed);
        assert_eq!(result.attempts_taken, 1);
    }

    let stats = app.quiz().attempts_admin(CAPPED_QUIZ).await.unwrap();
    assert_eq!(stats.len(), 40);
    assert!(stats.iter().all(|row| row.attempt_count == 1 && row.passed));

    let overview = app.aggregation().admin_overview().await.unwrap();
    assert_eq!(overview.len(), 40);
    assert!(
        overview
            .iter()
            .all(|row| row.courses[0].completed_lessons == 1)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn racing_submissions_never_exceed_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let storage = file_storage(dir.path(), 1).await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let question = add_question(&app, SINGLE_TRY_QUIZ).await;

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let quiz = app.quiz();
        tasks.spawn(async move {
            quiz.submit(
                UserId::new(1),
                SINGLE_TRY_QUIZ,
                vec![SubmittedAnswer::single(question, 0)],
            )
            .await
        });
    }

    let mut accepted = 0;
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(result) => {
                accepted += 1;
                assert_eq!(result.attempts_taken, 1);
            }
            Err(err) => assert_eq!(err.kind(), ErrorKind::AttemptLimitExceeded, "{err}"),
        }
    }
    assert_eq!(accepted, 1);

    let rows = storage
        .attempts
        .attempts_for(UserId::new(1), SINGLE_TRY_QUIZ)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn module_reset_racing_submissions_leaves_no_orphaned_attempts() {
    let dir = tempfile::tempdir().unwrap();
    let storage = file_storage(dir.path(), 1).await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let question = add_question(&app, OPEN_QUIZ).await;
    let learner = UserId::new(1);

    let mut submissions = JoinSet::new();
    let mut resets = JoinSet::new();
    for round in 0..24 {
        if round % 3 == 0 {
            let aggregation = app.aggregation();
            resets.spawn(async move { aggregation.reset_module_progress(learner, MODULE).await });
        } else {
            let quiz = app.quiz();
            submissions.spawn(async move {
                quiz.submit(learner, OPEN_QUIZ, vec![SubmittedAnswer::single(question, 1)])
                    .await
            });
        }
    }

    while let Some(joined) = submissions.join_next().await {
        joined.unwrap().unwrap();
    }
    while let Some(joined) = resets.join_next().await {
        joined.unwrap().unwrap();
    }

    let attempts = storage.attempts.attempts_for(learner, OPEN_QUIZ).await.unwrap();
    let progress = storage.progress.get_progress(learner, OPEN_QUIZ).await.unwrap();
    if attempts.is_empty() {
        assert!(progress.is_none());
    } else {
        let progress = progress.expect("attempts without a progress row");
        assert!(progress.is_completed());
    }
}
