//! Webhook endpoint handler.
//!
//! Runs the changelog pipeline for each GitHub delivery and maps its outcome
//! to a status code and JSON body. This is the only place pipeline results
//! become HTTP.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use super::AppState;
use crate::effects::InterpreterFactory;
use crate::llm::TextBackend;
use crate::pipeline::{Delivery, PipelineError, PushOutcome};
use crate::quota::CounterStore;
use crate::types::DeliveryId;

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that can occur when processing a webhook.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            WebhookError::MissingHeader(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Bad request", "message": self.to_string() }),
            ),
            WebhookError::Pipeline(PipelineError::Authentication) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Invalid signature", "message": self.to_string() }),
            ),
            WebhookError::Pipeline(PipelineError::Malformed(_)) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Malformed payload", "message": self.to_string() }),
            ),
            WebhookError::Pipeline(PipelineError::QuotaExceeded {
                plan,
                current,
                limit,
                upgrade_url,
                ..
            }) => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "Rate limit exceeded",
                    "plan": plan,
                    "limit": limit,
                    "current": current,
                    "upgrade_url": upgrade_url,
                }),
            ),
            WebhookError::Pipeline(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": "Internal error", "message": self.to_string() }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

/// Maps a successful run to its 200 response body.
fn outcome_body(outcome: &PushOutcome) -> serde_json::Value {
    match outcome {
        PushOutcome::Ignored(reason) => json!({ "message": reason.to_string() }),
        PushOutcome::Skipped => {
            json!({ "message": "Skipped: last commit carries a skip marker" })
        }
        PushOutcome::NoSignificantCommits => {
            json!({ "message": "No significant commits to process" })
        }
        PushOutcome::Published(summary) => json!({
            "success": true,
            "message": "Changelog updated successfully",
            "commits_processed": summary.commits_processed,
            "plan": summary.plan,
            "remaining": summary.remaining,
            "includes_summary": summary.includes_summary,
            "commit_sha": summary.commit_sha,
        }),
    }
}

/// Webhook handler.
///
/// # Request
///
/// - Method: POST
/// - Required headers:
///   - `X-GitHub-Event`: Event type; only `push` is processed
/// - Optional headers:
///   - `X-Hub-Signature-256`: HMAC-SHA256 signature of the payload, required
///     when a webhook secret is configured
///   - `X-GitHub-Delivery`: Delivery ID, used in logs
/// - Body: JSON webhook payload
///
/// # Response
///
/// - 200 OK: Ignored, skipped, or changelog published
/// - 400 Bad Request: Missing event header or malformed payload
/// - 401 Unauthorized: Invalid signature
/// - 402 Payment Required: Monthly limit reached
/// - 500 Internal Server Error: Generation or publish failed
pub async fn webhook_handler<F, B, S>(
    State(app_state): State<AppState<F, B, S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), WebhookError>
where
    F: InterpreterFactory,
    B: TextBackend,
    S: CounterStore,
{
    let event_type = header(&headers, HEADER_EVENT).ok_or(WebhookError::MissingHeader(HEADER_EVENT))?;
    let signature = header(&headers, HEADER_SIGNATURE);
    let delivery_id = header(&headers, HEADER_DELIVERY).map(DeliveryId::new);

    debug!(
        delivery_id = delivery_id.as_ref().map(DeliveryId::as_str).unwrap_or("-"),
        event_type = %event_type,
        "Received webhook"
    );

    let outcome = app_state
        .pipeline()
        .handle(Delivery {
            event_type: &event_type,
            signature: signature.as_deref(),
            delivery_id: delivery_id.as_ref(),
            body: &body,
        })
        .await?;

    Ok((StatusCode::OK, Json(outcome_body(&outcome))))
}

/// Extracts a header value as a string.
fn header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
