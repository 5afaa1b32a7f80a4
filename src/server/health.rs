//! Liveness endpoint.
//!
//! Answers without touching GitHub, the generative backend, or the quota
//! store, so a slow dependency never makes the process look dead.

use axum::http::StatusCode;

/// Returns 200 OK with the text "OK".
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
