//! `textq-core`: job pipeline building blocks.
//!
//! This crate contains **pure** primitives shared by the gateway and the worker
//! (no queue, database or HTTP concerns).

pub mod error;
pub mod id;
pub mod job;
pub mod message;

pub use error::{DomainError, DomainResult};
pub use id::JobId;
pub use job::{
    AnalysisResult, JobStatus, JobView, MAX_ERROR_CHARS, Span, TokenSpan, truncate_error,
    validate_text,
};
pub use message::{JobMessage, PAYLOAD_FIELD, PayloadError};
