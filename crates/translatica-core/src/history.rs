//! Best-effort translation history.
//!
//! Successful translations are handed to a [`HistoryRecorder`], which queues
//! them for a background writer. The request path never waits on storage.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;

const HISTORY_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct TranslationRecord {
    pub id: i64,
    pub source_text: String,
    pub translated_text: String,
    pub timestamp: DateTime<Utc>,
}

/// A record that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTranslation {
    pub source_text: String,
    pub translated_text: String,
    pub timestamp: DateTime<Utc>,
}

impl NewTranslation {
    pub fn now(source_text: impl Into<String>, translated_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            translated_text: translated_text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Append-only storage for translation records.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, record: NewTranslation) -> Result<i64>;

    /// Most recent records first.
    async fn recent(&self, limit: u32) -> Result<Vec<TranslationRecord>>;
}

pub struct SqliteHistoryStore {
    pool: SqlitePool,
}

impl SqliteHistoryStore {
    /// Connect to a `sqlite://` URL, creating the database file and table if needed.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        Self::connect_with(options).await
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect_with(options).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self> {
        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS translations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_text TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn append(&self, record: NewTranslation) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO translations (source_text, translated_text, timestamp) VALUES (?, ?, ?)",
        )
        .bind(&record.source_text)
        .bind(&record.translated_text)
        .bind(record.timestamp)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: u32) -> Result<Vec<TranslationRecord>> {
        let records = sqlx::query_as::<_, TranslationRecord>(
            "SELECT id, source_text, translated_text, timestamp
             FROM translations
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}

/// Fire-and-forget handle to the history writer task.
#[derive(Clone)]
pub struct HistoryRecorder {
    tx: Option<mpsc::Sender<NewTranslation>>,
}

impl HistoryRecorder {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn HistoryStore>) -> Self {
        Self::with_capacity(store, HISTORY_QUEUE_CAPACITY)
    }

    pub fn with_capacity(store: Arc<dyn HistoryStore>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(run_writer(rx, store));
        Self { tx: Some(tx) }
    }

    /// A recorder that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a record without waiting. Returns whether it was queued.
    pub fn record(&self, source_text: &str, translated_text: &str) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };

        match tx.try_send(NewTranslation::now(source_text, translated_text)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("History queue full, dropping translation record");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("History writer is offline, dropping translation record");
                false
            }
        }
    }
}

async fn run_writer(mut rx: mpsc::Receiver<NewTranslation>, store: Arc<dyn HistoryStore>) {
    while let Some(record) = rx.recv().await {
        match store.append(record).await {
            Ok(id) => debug!("Saved translation record {}", id),
            Err(err) => warn!("Failed to save translation record: {}", err),
        }
    }
    info!("History writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FailingStore {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for FailingStore {
        async fn append(&self, _record: NewTranslation) -> Result<i64> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::DatabaseError("disk I/O error".to_string()))
        }

        async fn recent(&self, _limit: u32) -> Result<Vec<TranslationRecord>> {
            Err(Error::DatabaseError("disk I/O error".to_string()))
        }
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    #[tokio::test]
    async fn test_sqlite_store_appends_and_lists_recent() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteHistoryStore::open(&dir.path().join("history.db"))
            .await
            .unwrap();

        let first = store
            .append(NewTranslation::now("Hello world", "Hola mundo"))
            .await
            .unwrap();
        let second = store.append(NewTranslation::now("Hi", "Hola")).await.unwrap();
        assert!(second > first);

        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].source_text, "Hi");
        assert_eq!(records[1].translated_text, "Hola mundo");

        assert_eq!(store.recent(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connect_creates_missing_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("data").join("translations.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());

        let store = SqliteHistoryStore::connect(&url).await.unwrap();
        store.append(NewTranslation::now("Hi", "Hola")).await.unwrap();
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_recorder_persists_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteHistoryStore::open(&dir.path().join("history.db"))
                .await
                .unwrap(),
        );
        let recorder = HistoryRecorder::spawn(store.clone());

        assert!(recorder.record("Hello world", "Hola mundo"));

        for _ in 0..100 {
            if !store.recent(1).await.unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let records = store.recent(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source_text, "Hello world");
    }

    #[tokio::test]
    async fn test_recorder_swallows_store_failures() {
        let store = Arc::new(FailingStore {
            attempts: AtomicUsize::new(0),
        });
        let recorder = HistoryRecorder::spawn(store.clone());

        assert!(recorder.record("Hi", "Hola"));
        assert!(recorder.record("Hi", "Hola"));
        wait_for(|| store.attempts.load(Ordering::SeqCst) == 2).await;

        // The writer survives failures and keeps draining.
        assert!(recorder.record("Hi", "Hola"));
        wait_for(|| store.attempts.load(Ordering::SeqCst) == 3).await;
    }

    #[tokio::test]
    async fn test_disabled_recorder_drops_records() {
        let recorder = HistoryRecorder::disabled();
        assert!(!recorder.record("Hi", "Hola"));
    }
}
