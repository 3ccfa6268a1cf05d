#![forbid(unsafe_code)]

pub mod aggregation_service;
pub mod app_services;
pub mod error;
pub mod progress_service;
pub mod quiz_service;

pub use lms_core::Clock;

pub use aggregation_service::AggregationService;
pub use app_services::AppServices;
pub use error::{AppServicesError, ErrorKind, ProgressServiceError, QuizServiceError};
pub use progress_service::ProgressService;
pub use quiz_service::{LearnerAttemptStats, QuizService, SubmissionResult};
