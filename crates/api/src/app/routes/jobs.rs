use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path, rejection::BytesRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::debug;

use textq_core::{DomainError, JobId, validate_text};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// `POST /v1/analyze`: validate, persist, enqueue. Returns `202 {job_id}`.
pub async fn analyze(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Bytes, BytesRejection>,
) -> axum::response::Response {
    let body = match body {
        Ok(b) => b,
        Err(rejection) => return errors::body_rejection_to_response(rejection),
    };

    let request = match dto::parse_analyze_request(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    if let Err(e) = validate_text(&request.text, services.max_text_bytes) {
        return errors::domain_error_to_response(e);
    }

    match services.dispatcher.submit(&request.text).await {
        Ok(submitted) => (
            StatusCode::ACCEPTED,
            Json(dto::AnalyzeResponse {
                job_id: submitted.job_id,
            }),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

/// `GET /v1/jobs/:id`: `{job_id, status, error?, result?}`.
pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.store.query(job_id).await {
        Ok(Some(view)) => Json(view).into_response(),
        Ok(None) => {
            debug!(%job_id, "job not found");
            errors::domain_error_to_response(DomainError::not_found())
        }
        Err(e) => errors::store_error_to_response(e),
    }
}
