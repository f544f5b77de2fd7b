use axum::Json;
use serde_json::{Value, json};

/// Liveness only; does not touch the store or the queue.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
