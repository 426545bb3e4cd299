//! Application state shared by all handlers

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};
use translatica_core::{HistoryRecorder, HistoryStore, ResourceManager, TranslationService};

use crate::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ResourceManager>,
    pub service: TranslationService,
    pub history: HistoryRecorder,
    /// Read side of the history database, absent when history is disabled
    pub history_store: Option<Arc<dyn HistoryStore>>,
    /// Concurrency limiter to prevent resource exhaustion
    pub request_semaphore: Arc<Semaphore>,
}

impl AppState {
    pub fn new(
        manager: Arc<ResourceManager>,
        history_store: Option<Arc<dyn HistoryStore>>,
        max_concurrent: usize,
        request_timeout: Duration,
    ) -> Self {
        let service = TranslationService::new(manager.clone()).with_timeout(request_timeout);
        let history = match &history_store {
            Some(store) => HistoryRecorder::spawn(store.clone()),
            None => HistoryRecorder::disabled(),
        };
        Self {
            manager,
            service,
            history,
            history_store,
            request_semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Acquire a permit for concurrent request processing
    pub async fn acquire_permit(&self) -> Result<SemaphorePermit<'_>, ApiError> {
        self.request_semaphore
            .acquire()
            .await
            .map_err(|_| ApiError::internal("Server is shutting down"))
    }
}
