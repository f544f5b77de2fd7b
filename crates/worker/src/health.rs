//! `GET /healthz` for the worker process.
//!
//! Reports which consumer/group/stream this process serves and its running
//! delivery counters. Liveness only: it does not probe Redis or Postgres.

use std::sync::Arc;

use axum::{Extension, Json, Router, routing::get};
use serde::Serialize;

use textq_infra::workers::{JobWorker, WorkerStats, WorkerStatsSnapshot};

#[derive(Debug, Clone)]
pub struct HealthState {
    pub consumer: String,
    pub group: String,
    pub stream: String,
    pub stats: Arc<WorkerStats>,
}

impl HealthState {
    pub fn for_worker(worker: &JobWorker) -> Self {
        let cfg = worker.config();
        Self {
            consumer: cfg.consumer.clone(),
            group: cfg.group.clone(),
            stream: cfg.stream.clone(),
            stats: worker.stats(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub consumer: String,
    pub group: String,
    pub stream: String,
    pub stats: WorkerStatsSnapshot,
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .layer(Extension(Arc::new(state)))
}

pub async fn healthz(Extension(state): Extension<Arc<HealthState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        consumer: state.consumer.clone(),
        group: state.group.clone(),
        stream: state.stream.clone(),
        stats: state.stats.snapshot(),
    })
}
