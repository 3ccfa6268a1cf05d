use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lms_core::model::{
    Course, CourseId, CourseModule, Lesson, LessonId, LessonType, ModuleId, QuestionDraft,
    QuizSettings, SubmittedAnswer, User, UserId,
};
use services::{AppServices, Clock};
use storage::repository::Storage;

#[derive(Parser)]
#[command(name = "lms", version)]
#[command(about = "Quiz assessment and progress reporting over a SQLite store")]
struct Cli {
    /// SQLite database URL or file path
    #[arg(long = "db", env = "LMS_DB_URL", default_value = "sqlite://lms.sqlite3")]
    db_url: String,

    /// Log filter directives, e.g. `info` or `services=debug`
    #[arg(long = "log", env = "LMS_LOG", default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the demo course, questions and users
    Seed,
    /// Completion percentage per course for every user
    Overview,
    /// Detailed progress across all courses, or one course report
    Progress {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        course: Option<CourseId>,
    },
    /// Questions of a lesson as a learner sees them
    Questions {
        #[arg(long)]
        lesson: LessonId,
    },
    /// Mark a non-quiz lesson complete for a learner
    Complete {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        lesson: LessonId,
    },
    /// Submit answers given as a JSON array
    Submit {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        lesson: LessonId,
        /// e.g. `[{"questionId":1,"selectedOptionIndex":0}]`
        #[arg(long)]
        answers: String,
    },
    /// Attempt history: one learner's, or folded per learner when `--user` is omitted
    Attempts {
        #[arg(long)]
        lesson: LessonId,
        #[arg(long)]
        user: Option<UserId>,
    },
    /// Reset a learner's attempts and progress for a lesson, module or course
    Reset {
        #[arg(long)]
        user: UserId,
        #[command(flatten)]
        scope: ResetScope,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ResetScope {
    #[arg(long)]
    lesson: Option<LessonId>,
    #[arg(long)]
    module: Option<ModuleId>,
    #[arg(long)]
    course: Option<CourseId>,
}

fn init_tracing(directives: &str) {
    let filter = EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turns file paths and relative `sqlite://` URLs into absolute `sqlite://` URLs.
fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.contains("mode=memory") {
        return trimmed.to_owned();
    }

    let path_str = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let path = Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

/// Creates the database file and its parent directory if missing.
fn prepare_sqlite_file(db_url: &str) -> Result<()> {
    if db_url == "sqlite::memory:" || db_url.contains("mode=memory") {
        return Ok(());
    }

    let Some(path) = db_url.strip_prefix("sqlite://") else {
        bail!("invalid --db value: {db_url}");
    };
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        bail!("invalid --db value: {db_url}");
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("creating {}", path.display()))?;
    }
    Ok(())
}

struct DemoCatalog {
    course: Course,
    modules: Vec<CourseModule>,
    lessons: Vec<Lesson>,
    questions: Vec<(LessonId, QuestionDraft)>,
    users: Vec<User>,
}

fn demo_catalog(clock: Clock) -> Result<DemoCatalog, lms_core::Error> {
    let now = clock.now();
    let course = Course::new(CourseId::new(1), "Rust Foundations", 0)?;
    let modules = vec![
        CourseModule::new(ModuleId::new(1), course.id(), "Ownership", 0)?,
        CourseModule::new(ModuleId::new(2), course.id(), "Traits", 1)?,
    ];

    let graded = QuizSettings::new(70, 3, true)?;
    let practice = QuizSettings::default().with_randomization(true, true);
    let lessons = vec![
        Lesson::new(
            LessonId::new(1),
            ModuleId::new(1),
            "Moves and borrows",
            LessonType::Video,
            0,
            QuizSettings::default(),
        )?,
        Lesson::new(
            LessonId::new(2),
            ModuleId::new(1),
            "Ownership check",
            LessonType::Quiz,
            1,
            graded,
        )?,
        Lesson::new(
            LessonId::new(3),
            ModuleId::new(2),
            "Trait objects",
            LessonType::Text,
            0,
            QuizSettings::default(),
        )?,
        Lesson::new(
            LessonId::new(4),
            ModuleId::new(2),
            "Trait practice",
            LessonType::Quiz,
            1,
            practice,
        )?,
    ];

    let questions = vec![
        (
            LessonId::new(2),
            QuestionDraft {
                text: "What happens to a `String` passed by value?".into(),
                options: vec![
                    "It is copied".into(),
                    "Ownership moves to the callee".into(),
                    "It is borrowed".into(),
                ],
                correct_option_index: Some(1),
                ..QuestionDraft::default()
            },
        ),
        (
            LessonId::new(2),
            QuestionDraft {
                text: "Which types implement `Copy`?".into(),
                options: vec!["u32".into(), "Vec<u8>".into(), "bool".into(), "String".into()],
                multi_select: true,
                correct_option_indices: Some(vec![0, 2]),
                order: 1,
                ..QuestionDraft::default()
            },
        ),
        (
            LessonId::new(4),
            QuestionDraft {
                text: "Which keyword makes a trait object?".into(),
                options: vec!["impl".into(), "dyn".into()],
                correct_option_index: Some(1),
                ..QuestionDraft::default()
            },
        ),
    ];

    let users = vec![
        User::new(UserId::new(1), "ada@example.com", "Ada", "Lovelace", now),
        User::new(UserId::new(2), "alan@example.com", "Alan", "Turing", now),
    ];

    Ok(DemoCatalog {
        course,
        modules,
        lessons,
        questions,
        users,
    })
}

async fn seed(db_url: &str, clock: Clock) -> Result<()> {
    let demo = demo_catalog(clock)?;
    let storage = Storage::sqlite(db_url)
        .await
        .with_context(|| format!("opening {db_url}"))?;
    let app = AppServices::from_storage(&storage, clock);

    storage.catalog.upsert_course(&demo.course).await?;
    for module in &demo.modules {
        storage.catalog.upsert_module(module).await?;
    }
    for lesson in &demo.lessons {
        storage.catalog.upsert_lesson(lesson).await?;
    }
    for user in &demo.users {
        storage.users.upsert_user(user).await?;
    }

    let quiz = app.quiz();
    let mut created = 0_usize;
    for (lesson_id, draft) in demo.questions {
        let existing = storage.questions.questions_for_lesson(lesson_id).await?;
        if existing.iter().any(|q| q.text() == draft.text) {
            continue;
        }
        quiz.create_question(lesson_id, draft).await?;
        created += 1;
    }

    info!(
        course_id = demo.course.id().value(),
        lessons = demo.lessons.len(),
        users = demo.users.len(),
        questions_created = created,
        "demo data seeded"
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let db_url = normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;
    let clock = Clock::system();
    let app = AppServices::new_sqlite(&db_url, clock)
        .await
        .with_context(|| format!("opening {db_url}"))?;

    match cli.command {
        Command::Seed => seed(&db_url, clock).await,
        Command::Overview => print_json(&app.aggregation().admin_overview().await?),
        Command::Progress { user, course } => match course {
            Some(course) => print_json(&app.progress().course_progress(user, course).await?),
            None => print_json(&app.aggregation().user_detailed_progress(user).await?),
        },
        Command::Questions { lesson } => print_json(&app.quiz().learner_questions(lesson).await?),
        Command::Complete { user, lesson } => {
            print_json(&app.progress().mark_complete(user, lesson).await?)
        }
        Command::Submit {
            user,
            lesson,
            answers,
        } => {
            let answers: Vec<SubmittedAnswer> =
                serde_json::from_str(&answers).context("parsing --answers")?;
            print_json(&app.quiz().submit(user, lesson, answers).await?)
        }
        Command::Attempts { lesson, user } => match user {
            Some(user) => print_json(&app.quiz().attempts(user, lesson).await?),
            None => print_json(&app.quiz().attempts_admin(lesson).await?),
        },
        Command::Reset { user, scope } => {
            if let Some(lesson) = scope.lesson {
                print_json(&app.quiz().reset_attempts(user, lesson).await?)
            } else if let Some(module) = scope.module {
                print_json(&app.aggregation().reset_module_progress(user, module).await?)
            } else if let Some(course) = scope.course {
                print_json(&app.aggregation().reset_course_progress(user, course).await?)
            } else {
                bail!("one of --lesson, --module or --course is required")
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log);

    if let Err(err) = run(cli).await {
        eprintln!("{err:#}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("data/lms.sqlite3");
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/lms.sqlite3"));

        let url = normalize_sqlite_url("sqlite://lms.sqlite3");
        assert!(url.starts_with("sqlite:///"));

        assert_eq!(
            normalize_sqlite_url("sqlite:file:demo?mode=memory&cache=shared"),
            "sqlite:file:demo?mode=memory&cache=shared"
        );
    }

    #[test]
    fn demo_catalog_is_valid() {
        let demo = demo_catalog(Clock::fixed(lms_core::time::fixed_now())).unwrap();
        assert_eq!(demo.lessons.len(), 4);
        assert!(demo.questions.iter().all(|(id, _)| {
            demo.lessons
                .iter()
                .any(|lesson| lesson.id() == *id && lesson.is_quiz())
        }));
    }

    #[test]
    fn cli_requires_exactly_one_reset_scope() {
        assert!(Cli::try_parse_from(["lms", "reset", "--user", "1"]).is_err());
        assert!(
            Cli::try_parse_from(["lms", "reset", "--user", "1", "--lesson", "2", "--course", "1"])
                .is_err()
        );
        assert!(Cli::try_parse_from(["lms", "reset", "--user", "1", "--module", "2"]).is_ok());
    }

    #[test]
    fn complete_takes_user_and_lesson_ids() {
        let cli = Cli::try_parse_from(["lms", "complete", "--user", "3", "--lesson", "7"]).unwrap();
        match cli.command {
            Command::Complete { user, lesson } => {
                assert_eq!(user, UserId::new(3));
                assert_eq!(lesson, LessonId::new(7));
            }
            _ => panic!("expected the complete command"),
        }
        assert!(Cli::try_parse_from(["lms", "complete", "--user", "x", "--lesson", "7"]).is_err());
    }
}
