use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::aggregation_service::AggregationService;
use crate::error::AppServicesError;
use crate::progress_service::ProgressService;
use crate::quiz_service::QuizService;

/// Assembles the quiz, progress and aggregation services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    quiz: Arc<QuizService>,
    progress: Arc<ProgressService>,
    aggregation: Arc<AggregationService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if the database cannot be opened or migrated.
    pub async fn new_sqlite(db_url: &str, clock: Clock) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock))
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock) -> Self {
        let quiz = Arc::new(QuizService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.questions),
            Arc::clone(&storage.users),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.ledger),
        ));
        let progress = Arc::new(ProgressService::new(
            clock,
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.progress),
        ));
        let aggregation = Arc::new(AggregationService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.users),
            Arc::clone(&storage.progress),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.ledger),
        ));

        Self {
            quiz,
            progress,
            aggregation,
        }
    }

    #[must_use]
    pub fn quiz(&self) -> Arc<QuizService> {
        Arc::clone(&self.quiz)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn aggregation(&self) -> Arc<AggregationService> {
        Arc::clone(&self.aggregation)
    }
}
