//! Queue wire message.
//!
//! A stream entry carries a single field, [`PAYLOAD_FIELD`], whose value is a
//! UTF-8 JSON object `{"job_id": "<uuid>"}`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::JobId;

/// Name of the stream entry field holding the JSON payload.
pub const PAYLOAD_FIELD: &str = "payload";

/// Malformed queue entry. Deliveries failing to decode are acknowledged and dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing 'payload' field in stream message")]
    MissingPayload,

    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("missing job_id in payload")]
    MissingJobId,

    #[error("invalid job_id '{0}'")]
    InvalidJobId(String),
}

/// Body of a queue entry referencing a job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub job_id: JobId,
}

impl JobMessage {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }

    /// Encode as the JSON bytes stored under [`PAYLOAD_FIELD`].
    pub fn encode(&self) -> Vec<u8> {
        serde_json::json!({ "job_id": self.job_id.to_string() })
            .to_string()
            .into_bytes()
    }

    /// Decode the raw `payload` field of a delivery.
    ///
    /// `None` means the entry had no payload field at all.
    pub fn decode(raw: Option<&[u8]>) -> Result<Self, PayloadError> {
        let raw = match raw {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => return Err(PayloadError::MissingPayload),
        };

        let value: serde_json::Value =
            serde_json::from_slice(raw).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

        let job_id = match value.get("job_id") {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Null) | None => return Err(PayloadError::MissingJobId),
            Some(serde_json::Value::String(_)) => return Err(PayloadError::MissingJobId),
            Some(other) => return Err(PayloadError::InvalidJobId(other.to_string())),
        };

        let job_id = job_id
            .parse::<JobId>()
            .map_err(|_| PayloadError::InvalidJobId(job_id.clone()))?;

        Ok(Self { job_id })
    }
}
