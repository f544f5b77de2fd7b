use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use tracing::error;

use textq_core::DomainError;
use textq_infra::DispatchError;
use textq_infra::job_store::StoreError;

pub fn domain_error_to_response(err: DomainError) -> axum::response::Response {
    match err {
        DomainError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        DomainError::TooLarge(_) => {
            json_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large", err.to_string())
        }
        DomainError::InvalidId(_) => json_error(StatusCode::BAD_REQUEST, "invalid_id", "Invalid job_id"),
        DomainError::NotFound => json_error(StatusCode::NOT_FOUND, "not_found", "Not found"),
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Store(e) => store_error_to_response(e),
        DispatchError::Enqueue { job_id, source } => {
            error!(%job_id, error = %source, "job created but enqueue failed");
            json_error(StatusCode::BAD_GATEWAY, "enqueue_error", source.to_string())
        }
    }
}

pub fn store_error_to_response(err: StoreError) -> axum::response::Response {
    match err {
        StoreError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "Not found"),
        other => {
            error!(error = %other, "job store call failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", other.to_string())
        }
    }
}

/// Body could not be read (too large for the transport limit, aborted, ...).
pub fn body_rejection_to_response(rejection: BytesRejection) -> axum::response::Response {
    let status = rejection.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_body"
    };
    json_error(status, code, rejection.body_text())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
