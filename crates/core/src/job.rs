//! Job state machine and result types.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::id::JobId;

/// Maximum number of characters stored in a job's `error` field.
pub const MAX_ERROR_CHARS: usize = 2000;

/// Job lifecycle status.
///
/// ```text
/// queued ──► running ──► done
///    │          │
///    └──────────┴──────► error
/// ```
///
/// `done` and `error` are terminal for `mark_running`; only the worker's
/// result/error writes may move a job between them.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Whether `mark_running` may (re)enter `running` from this status.
    pub fn can_start(&self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            other => Err(DomainError::validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// Half-open character range `[start, end)` over the submitted text.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// A token span together with the token's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Segmentation output stored for a finished job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub sentences: Vec<Span>,
    pub tokens: Vec<TokenSpan>,
}

/// What a status query returns for a job.
///
/// `result` is only populated when `status == done`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
}

/// Truncate an error message to at most [`MAX_ERROR_CHARS`] characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_CHARS) {
        Some((cut, _)) => message[..cut].to_string(),
        None => message.to_string(),
    }
}

/// Validate submitted text against the gateway rules.
///
/// Text must contain at least one non-whitespace character and fit into
/// `max_bytes` once UTF-8 encoded.
pub fn validate_text(text: &str, max_bytes: usize) -> DomainResult<()> {
    if text.trim().is_empty() {
        return Err(DomainError::validation("Field 'text' must be a non-empty string"));
    }
    if text.len() > max_bytes {
        return Err(DomainError::TooLarge(max_bytes));
    }
    Ok(())
}
