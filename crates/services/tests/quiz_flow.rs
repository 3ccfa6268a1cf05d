use chrono::Duration;
use lms_core::model::{
    Course, CourseId, CourseModule, Lesson, LessonId, LessonType, ModuleId, QuestionDraft,
    QuestionPatch, QuizSettings, SubmittedAnswer, User, UserId,
};
use lms_core::time::fixed_now;
use services::{AppServices, Clock, ErrorKind};
use storage::repository::Storage;

const LEARNER: UserId = UserId::new(1);
const QUIZ: LessonId = LessonId::new(3);

async fn seeded_storage(name: &str) -> Storage {
    let storage = Storage::sqlite(&format!("sqlite:file:{name}?mode=memory&cache=shared"))
        .await
        .expect("connect sqlite");

    storage
        .catalog
        .upsert_course(&Course::new(CourseId::new(1), "Ownership", 0).unwrap())
        .await
        .unwrap();
    for (id, order) in [(1, 0), (2, 1)] {
        storage
            .catalog
            .upsert_module(
                &CourseModule::new(ModuleId::new(id), CourseId::new(1), format!("M{id}"), order)
                    .unwrap(),
            )
            .await
            .unwrap();
    }

    let lessons = [
        (1, 1, LessonType::Video, QuizSettings::default()),
        (2, 1, LessonType::Text, QuizSettings::default()),
        (3, 2, LessonType::Quiz, QuizSettings::new(60, 3, true).unwrap()),
        (4, 2, LessonType::Pdf, QuizSettings::default()),
    ];
    for (id, module, kind, quiz) in lessons {
        storage
            .catalog
            .upsert_lesson(
                &Lesson::new(
                    LessonId::new(id),
                    ModuleId::new(module),
                    format!("Lesson {id}"),
                    kind,
                    i64::try_from(id).unwrap(),
                    quiz,
                )
                .unwrap(),
            )
            .await
            .unwrap();
    }

    storage
        .users
        .upsert_user(&User::new(
            LEARNER,
            "learner@example.com",
            "Grace",
            "Hopper",
            fixed_now(),
        ))
        .await
        .unwrap();
    storage
}

#[tokio::test]
async fn quiz_submission_flow_on_sqlite() {
    let storage = seeded_storage("memdb_quiz_flow").await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let quiz = app.quiz();

    let q1 = quiz
        .create_question(
            QUIZ,
            QuestionDraft {
                text: "Who owns a moved value?".into(),
                options: vec!["caller".into(), "callee".into()],
                correct_option_index: Some(1),
                ..QuestionDraft::default()
            },
        )
        .await
        .unwrap();
    let q2 = quiz
        .create_question(
            QUIZ,
            QuestionDraft {
                text: "Which types are Copy?".into(),
                options: vec!["u32".into(), "String".into(), "bool".into()],
                multi_select: true,
                correct_option_indices: Some(vec![0, 2]),
                order: 1,
                ..QuestionDraft::default()
            },
        )
        .await
        .unwrap();

    let learner_view = quiz.learner_questions(QUIZ).await.unwrap();
    assert_eq!(learner_view.len(), 2);
    let json = serde_json::to_value(&learner_view).unwrap();
    assert!(json[0].get("correctOptionIndex").is_none());

    // Half right misses the 60% pass mark.
    let failed = quiz
        .submit(
            LEARNER,
            QUIZ,
            vec![
                SubmittedAnswer::single(q1.id(), 1),
                SubmittedAnswer::multi(q2.id(), [0]),
            ],
        )
        .await
        .unwrap();
    assert_eq!(failed.correct_answers, 1);
    assert!((failed.score - 0.5).abs() < f64::EPSILON);
    assert!(!failed.passed);
    assert_eq!(failed.attempts_taken, 1);

    let passed = quiz
        .submit(
            LEARNER,
            QUIZ,
            vec![
                SubmittedAnswer::single(q1.id(), 1),
                SubmittedAnswer::multi(q2.id(), [2, 0]),
            ],
        )
        .await
        .unwrap();
    assert!(passed.passed);
    assert_eq!(passed.attempts_taken, 2);

    // A later failing attempt keeps completion but updates the score.
    let later = AppServices::from_storage(&storage, Clock::fixed(fixed_now()).later(Duration::hours(1)));
    later
        .quiz()
        .submit(LEARNER, QUIZ, vec![SubmittedAnswer::single(q1.id(), 0)])
        .await
        .unwrap();
    let progress = storage
        .progress
        .get_progress(LEARNER, QUIZ)
        .await
        .unwrap()
        .unwrap();
    assert!(progress.is_completed());
    assert_eq!(progress.completed_at(), Some(fixed_now()));
    assert_eq!(progress.score(), Some(0.0));

    let err = quiz
        .submit(LEARNER, QUIZ, vec![SubmittedAnswer::single(q1.id(), 1)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AttemptLimitExceeded);

    let history = quiz.attempts(LEARNER, QUIZ).await.unwrap();
    assert_eq!(history.len(), 3);
    assert!(history[0].created_at > history[2].created_at);

    let admin = quiz.attempts_admin(QUIZ).await.unwrap();
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].attempt_count, 3);
    assert!((admin[0].best_score - 1.0).abs() < f64::EPSILON);
    assert!(admin[0].passed);
    assert_eq!(admin[0].name, "Grace Hopper");

    // Reset reopens the lesson.
    let reopened = quiz.reset_attempts(LEARNER, QUIZ).await.unwrap().unwrap();
    assert!(!reopened.is_completed());
    assert_eq!(reopened.score(), None);
    assert!(quiz.attempts(LEARNER, QUIZ).await.unwrap().is_empty());
}

#[tokio::test]
async fn question_edits_do_not_rewrite_history() {
    let storage = seeded_storage("memdb_question_edits").await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));
    let quiz = app.quiz();

    let q = quiz
        .create_question(
            QUIZ,
            QuestionDraft {
                text: "Pick b".into(),
                options: vec!["a".into(), "b".into()],
                correct_option_index: Some(1),
                ..QuestionDraft::default()
            },
        )
        .await
        .unwrap();
    quiz.submit(LEARNER, QUIZ, vec![SubmittedAnswer::single(q.id(), 1)])
        .await
        .unwrap();

    quiz.update_question(
        q.id(),
        QuestionPatch {
            correct_option_index: Some(0),
            ..QuestionPatch::default()
        },
    )
    .await
    .unwrap();

    let rows = storage.attempts.attempts_for(LEARNER, QUIZ).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attempt.answers()[0].correct_option_index, Some(1));
    assert!(rows[0].attempt.answers()[0].is_correct);
}

#[tokio::test]
async fn progress_rollups_and_resets_on_sqlite() {
    let storage = seeded_storage("memdb_rollups").await;
    let app = AppServices::from_storage(&storage, Clock::fixed(fixed_now()));

    for lesson in [1, 2, 4] {
        app.progress()
            .mark_complete(LEARNER, LessonId::new(lesson))
            .await
            .unwrap();
    }
    let err = app.progress().mark_complete(LEARNER, QUIZ).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidOperation);

    let report = app
        .progress()
        .course_progress(LEARNER, CourseId::new(1))
        .await
        .unwrap();
    assert_eq!(report.completed_lessons, 3);
    assert_eq!(report.progress_percentage, 75);
    assert_eq!(report.modules[1].lessons[0].pass_mark_percentage, 60);

    let overview = app.aggregation().admin_overview().await.unwrap();
    assert_eq!(overview[0].courses[0].progress_percentage, 75);

    let counts = app
        .aggregation()
        .reset_module_progress(LEARNER, ModuleId::new(1))
        .await
        .unwrap();
    assert_eq!(counts.progress_deleted, 2);

    let detailed = app
        .aggregation()
        .user_detailed_progress(LEARNER)
        .await
        .unwrap();
    assert_eq!(detailed[0].completed_lessons, 1);
    assert_eq!(detailed[0].progress_percentage, 25);

    let unknown = app
        .aggregation()
        .reset_module_progress(LEARNER, ModuleId::new(99))
        .await
        .unwrap();
    assert_eq!(unknown.progress_deleted, 0);
}
