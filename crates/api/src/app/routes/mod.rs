use axum::{
    Router,
    routing::{get, post},
};

pub mod jobs;
pub mod system;

/// Router for the versioned job endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/v1/analyze", post(jobs::analyze))
        .route("/v1/jobs/:id", get(jobs::get_job))
}
