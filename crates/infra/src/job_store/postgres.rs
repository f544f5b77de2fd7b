//! Postgres-backed job store implementation.
//!
//! ## Schema
//!
//! - `jobs(id, status, payload_text, error, created_at, started_at, finished_at)`
//! - `results(job_id → jobs.id, sentences jsonb, tokens jsonb)`
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (foreign key violation) | `23503` | `NotFound` |
//! | Database (other) | Any other | `Storage` |
//! | PoolClosed / Io / other | N/A | `Storage` |
//!
//! ## Thread Safety
//!
//! `PostgresJobStore` is `Send + Sync`; every call checks a connection out of
//! the shared pool for the duration of that call only.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;

use textq_core::{AnalysisResult, JobId, JobStatus, JobView, Span, TokenSpan, truncate_error};

use super::r#trait::{JobRecord, JobStore, StoreError};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id UUID PRIMARY KEY,
        status TEXT NOT NULL CHECK (status IN ('queued', 'running', 'done', 'error')),
        payload_text TEXT NOT NULL,
        error TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        started_at TIMESTAMPTZ,
        finished_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS results (
        job_id UUID PRIMARY KEY REFERENCES jobs (id),
        sentences JSONB NOT NULL,
        tokens JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

/// Postgres-backed job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    /// Create a new PostgresJobStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Apply the (idempotent) schema.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| StoreError::Storage(format!("migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Load the full job row.
    #[instrument(skip(self), fields(job_id = %job_id), err)]
    pub async fn record(&self, job_id: JobId) -> Result<Option<JobRecord>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, status, payload_text, error, created_at, started_at, finished_at
            FROM jobs
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("record", job_id, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status").map_err(|e| decode_error(job_id, e))?;
        Ok(Some(JobRecord {
            id: JobId::from_uuid(row.try_get("id").map_err(|e| decode_error(job_id, e))?),
            status: parse_status(&status)?,
            payload_text: row.try_get("payload_text").map_err(|e| decode_error(job_id, e))?,
            error: row.try_get("error").map_err(|e| decode_error(job_id, e))?,
            created_at: row.try_get("created_at").map_err(|e| decode_error(job_id, e))?,
            started_at: row.try_get("started_at").map_err(|e| decode_error(job_id, e))?,
            finished_at: row.try_get("finished_at").map_err(|e| decode_error(job_id, e))?,
        }))
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, text), fields(job_id = %job_id, text_bytes = text.len()), err)]
    async fn create(&self, job_id: JobId, text: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, status, payload_text)
            VALUES ($1, 'queued', $2)
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(text)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("create", job_id, e))?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn fetch_text(&self, job_id: JobId) -> Result<Option<String>, StoreError> {
        let row = sqlx::query("SELECT payload_text FROM jobs WHERE id = $1")
            .bind(job_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("fetch_text", job_id, e))?;

        row.map(|r| r.try_get::<String, _>("payload_text"))
            .transpose()
            .map_err(|e| decode_error(job_id, e))
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn mark_running(&self, job_id: JobId) -> Result<bool, StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'running', started_at = COALESCE(started_at, now())
            WHERE id = $1 AND status IN ('queued', 'running')
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_running", job_id, e))?;

        Ok(done.rows_affected() > 0)
    }

    #[instrument(skip(self, message), fields(job_id = %job_id), err)]
    async fn mark_error(&self, job_id: JobId, message: &str) -> Result<(), StoreError> {
        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'error', error = $2, finished_at = COALESCE(finished_at, now())
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(truncate_error(message))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("mark_error", job_id, e))?;

        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(job_id));
        }
        Ok(())
    }

    #[instrument(
        skip(self, result),
        fields(
            job_id = %job_id,
            sentences = result.sentences.len(),
            tokens = result.tokens.len()
        ),
        err
    )]
    async fn save_result_and_done(
        &self,
        job_id: JobId,
        result: &AnalysisResult,
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", job_id, e))?;

        sqlx::query(
            r#"
            INSERT INTO results (job_id, sentences, tokens)
            VALUES ($1, $2, $3)
            ON CONFLICT (job_id)
            DO UPDATE SET sentences = EXCLUDED.sentences, tokens = EXCLUDED.tokens
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(Json(&result.sentences))
        .bind(Json(&result.tokens))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_result", job_id, e))?;

        let done = sqlx::query(
            r#"
            UPDATE jobs
            SET status = 'done', error = NULL, finished_at = COALESCE(finished_at, now())
            WHERE id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_done", job_id, e))?;

        if done.rows_affected() == 0 {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", job_id, e))?;
            return Err(StoreError::NotFound(job_id));
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit", job_id, e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn query(&self, job_id: JobId) -> Result<Option<JobView>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT j.status, j.error, r.sentences, r.tokens
            FROM jobs j
            LEFT JOIN results r ON r.job_id = j.id
            WHERE j.id = $1
            "#,
        )
        .bind(job_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query", job_id, e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: String = row.try_get("status").map_err(|e| decode_error(job_id, e))?;
        let status = parse_status(&status)?;
        let error: Option<String> = row.try_get("error").map_err(|e| decode_error(job_id, e))?;

        let result = if status == JobStatus::Done {
            let sentences: Option<Json<Vec<Span>>> =
                row.try_get("sentences").map_err(|e| decode_error(job_id, e))?;
            let tokens: Option<Json<Vec<TokenSpan>>> =
                row.try_get("tokens").map_err(|e| decode_error(job_id, e))?;
            match (sentences, tokens) {
                (Some(Json(sentences)), Some(Json(tokens))) => {
                    Some(AnalysisResult { sentences, tokens })
                }
                _ => None,
            }
        } else {
            None
        };

        Ok(Some(JobView {
            job_id,
            status,
            error,
            result,
        }))
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    raw.parse()
        .map_err(|e| StoreError::Storage(format!("unexpected status in jobs table: {e}")))
}

fn decode_error(job_id: JobId, err: sqlx::Error) -> StoreError {
    StoreError::Storage(format!("failed to decode row for job {job_id}: {err}"))
}

/// Map a SQLx error to a `StoreError`.
fn map_sqlx_error(operation: &str, job_id: JobId, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::AlreadyExists(job_id),
            Some("23503") => StoreError::NotFound(job_id),
            _ => StoreError::Storage(format!(
                "database error in {}: {}",
                operation,
                db_err.message()
            )),
        },
        sqlx::Error::PoolClosed => {
            StoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => StoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}
