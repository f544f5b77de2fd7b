//! Process-wide pipeline handles.
//!
//! Built once at startup and handed to the dispatcher and worker; there is no
//! global client state. `shutdown()` releases the database pool.

use std::sync::Arc;

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use textq_analyzer::Analyzer;

use crate::dispatcher::Dispatcher;
use crate::job_store::{InMemoryJobStore, JobStore, StoreError};
use crate::queue::{InMemoryQueue, Queue, QueueError};
use crate::workers::{JobWorker, WorkerConfig};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("database connection failed: {0}")]
    Database(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn Queue>,
    pub stream: String,
    pool: Option<PgPool>,
}

impl PipelineContext {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn Queue>, stream: impl Into<String>) -> Self {
        Self {
            store,
            queue,
            stream: stream.into(),
            pool: None,
        }
    }

    /// Fresh in-memory store and queue (tests, local runs).
    pub fn in_memory(stream: impl Into<String>) -> Self {
        Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(InMemoryQueue::new()),
            stream,
        )
    }

    /// Connect Postgres (and migrate) plus Redis Streams.
    #[cfg(feature = "redis")]
    pub async fn connect(
        queue: &crate::config::QueueArgs,
        database: &crate::config::DatabaseArgs,
    ) -> Result<Self, ContextError> {
        use sqlx::postgres::PgPoolOptions;

        use crate::job_store::PostgresJobStore;
        use crate::queue::RedisStreamsQueue;

        let pool = PgPoolOptions::new()
            .max_connections(database.max_connections)
            .connect(&database.database_url)
            .await
            .map_err(|e| ContextError::Database(e.to_string()))?;

        let store = PostgresJobStore::new(pool.clone());
        store.migrate().await?;

        let redis = RedisStreamsQueue::connect(&queue.redis_url).await?;
        info!(stream = %queue.stream, "pipeline connected");

        Ok(Self {
            store: Arc::new(store),
            queue: Arc::new(redis),
            stream: queue.stream.clone(),
            pool: Some(pool),
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.store.clone(), self.queue.clone(), self.stream.clone())
    }

    /// Worker bound to this context's store and queue. `config.stream` is
    /// overridden with the context stream.
    pub fn worker(&self, analyzer: Arc<dyn Analyzer>, config: WorkerConfig) -> JobWorker {
        let config = WorkerConfig {
            stream: self.stream.clone(),
            ..config
        };
        JobWorker::new(self.store.clone(), self.queue.clone(), analyzer, config)
    }

    pub async fn shutdown(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("database pool closed");
        }
    }
}
