//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: handles the handlers need (dispatcher, job store, limits)
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use textq_infra::PipelineContext;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Default cap on submitted text, in UTF-8 bytes.
pub const DEFAULT_MAX_TEXT_BYTES: usize = 2 * 1024 * 1024;

/// Transport-level body cap. JSON escaping can inflate text up to six-fold
/// (`\u00XX`), so the exact byte check happens after decoding.
fn body_limit(max_text_bytes: usize) -> usize {
    max_text_bytes.saturating_mul(6).saturating_add(64 * 1024)
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(ctx: &PipelineContext, max_text_bytes: usize) -> Router {
    let services = Arc::new(services::AppServices::from_context(ctx, max_text_bytes));

    Router::new()
        .route("/healthz", get(routes::system::health))
        .merge(routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(Extension(services))
                .layer(DefaultBodyLimit::max(body_limit(max_text_bytes))),
        )
}
