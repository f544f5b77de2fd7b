use axum::http::StatusCode;
use serde::Serialize;

use textq_core::{DomainError, JobId};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// `POST /v1/analyze` body. Only `text` is read; other fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub text: String,
}

/// Decode an analyze body by hand so every malformed shape maps to a 400
/// with the standard error body (not JSON, not an object, `text` missing or
/// not a string).
pub fn parse_analyze_request(body: &[u8]) -> Result<AnalyzeRequest, axum::response::Response> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(|e| {
        errors::json_error(StatusCode::BAD_REQUEST, "invalid_json", format!("invalid JSON body: {e}"))
    })?;

    match value.get("text") {
        Some(serde_json::Value::String(text)) => Ok(AnalyzeRequest { text: text.clone() }),
        _ => Err(errors::domain_error_to_response(DomainError::validation(
            "Field 'text' must be a non-empty string",
        ))),
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeResponse {
    pub job_id: JobId,
}
