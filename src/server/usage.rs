//! Usage inspection endpoint.
//!
//! Provides a read-only view of a repository's quota for the current month.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use super::AppState;
use crate::effects::InterpreterFactory;
use crate::llm::TextBackend;
use crate::quota::{CounterStore, StoreError, UsageStats};
use crate::types::RepoId;

/// A path segment that cannot be an owner or repository name.
#[derive(Debug, Error)]
#[error("invalid path component: {0:?}")]
pub struct InvalidPathComponent(pub String);

/// Accepts GitHub owner and repository names: ASCII alphanumerics, `-`, `_`
/// and `.`, but never `.` or `..` on their own.
pub fn validate_path_component(component: &str) -> Result<(), InvalidPathComponent> {
    let valid = !component.is_empty()
        && component.len() <= 100
        && component != "."
        && component != ".."
        && component
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(InvalidPathComponent(component.to_string()))
    }
}

/// Errors that can occur when fetching usage.
#[derive(Debug, Error)]
pub enum UsageError {
    #[error("{0}")]
    InvalidPath(#[from] InvalidPathComponent),

    #[error("quota store error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for UsageError {
    fn into_response(self) -> Response {
        let status = match &self {
            UsageError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            UsageError::Store(e) => {
                warn!(error = %e, "Failed to read usage");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Usage handler.
///
/// # Response
///
/// - 200 OK with JSON body containing [`UsageStats`]
/// - 400 Bad Request for invalid owner or repository names
/// - 500 Internal Server Error if the quota store cannot be read
///
/// # Example
///
/// ```ignore
/// GET /api/v1/repos/octocat/hello-world/usage HTTP/1.1
///
/// HTTP/1.1 200 OK
/// Content-Type: application/json
///
/// {"current": 12, "limit": 50, "remaining": 38, "plan": "free", "resets_at": "2024-04-01T00:00:00Z"}
/// ```
pub async fn usage_handler<F, B, S>(
    State(app_state): State<AppState<F, B, S>>,
    Path((owner, repo)): Path<(String, String)>,
) -> Result<Json<UsageStats>, UsageError>
where
    F: InterpreterFactory,
    B: TextBackend,
    S: CounterStore,
{
    validate_path_component(&owner)?;
    validate_path_component(&repo)?;

    let usage = app_state
        .pipeline()
        .quota()
        .usage(&RepoId::new(owner, repo))
        .await?;
    Ok(Json(usage))
}
