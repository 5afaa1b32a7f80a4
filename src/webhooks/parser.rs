//! Webhook payload parser.
//!
//! Parses raw webhook JSON into typed [`GitHubEvent`] values.
//!
//! # Parsing Strategy
//!
//! 1. The event type is determined from the `X-GitHub-Event` header
//! 2. Unknown event types return `Ok(None)` (ignored, not error)
//! 3. Known payloads are deserialized into raw structs, then every required
//!    field is validated explicitly; malformed payloads return `Err`

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::types::{RawCommit, RepoId, Sha};

use super::events::{GitHubEvent, PushEvent};

/// Error type for webhook parsing failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Field has invalid value (e.g., malformed SHA, bad timestamp).
    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a webhook payload into a typed event.
///
/// * `Ok(Some(event))` - a known event type
/// * `Ok(None)` - an event type the bot does not handle
/// * `Err(e)` - malformed payload or missing required fields
///
/// ```
/// use changelog_bot::webhooks::{GitHubEvent, parse_webhook};
///
/// let payload = br#"{
///     "ref": "refs/heads/main",
///     "repository": { "owner": { "login": "octocat" }, "name": "hello-world" },
///     "commits": []
/// }"#;
///
/// let event = parse_webhook("push", payload).unwrap();
/// assert!(matches!(event, Some(GitHubEvent::Push(_))));
/// assert!(parse_webhook("issues", payload).unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<GitHubEvent>, ParseError> {
    match event_type {
        "push" => parse_push(payload).map(|e| Some(GitHubEvent::Push(e))),
        _ => Ok(None),
    }
}

// ============================================================================
// Raw payload structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct RawRepository {
    owner: RawOwner,
    name: String,
    html_url: Option<String>,
    default_branch: Option<String>,
}

/// Push payloads populate `name` on the owner; most others populate `login`.
#[derive(Debug, Deserialize)]
struct RawOwner {
    login: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPushPayload {
    #[serde(rename = "ref")]
    ref_name: String,
    after: Option<String>,
    repository: RawRepository,
    commits: Vec<RawPushCommit>,
}

#[derive(Debug, Deserialize)]
struct RawPushCommit {
    id: String,
    message: String,
    timestamp: String,
    author: RawAuthor,
    parents: Option<Vec<RawParent>>,
}

#[derive(Debug, Deserialize)]
struct RawAuthor {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawParent {
    Sha(String),
    Object { sha: String },
}

impl RawParent {
    fn as_str(&self) -> &str {
        match self {
            RawParent::Sha(s) => s,
            RawParent::Object { sha } => sha,
        }
    }
}

// ============================================================================
// push event
// ============================================================================

fn parse_push(payload: &[u8]) -> Result<PushEvent, ParseError> {
    let raw: RawPushPayload = serde_json::from_slice(payload)?;

    let owner = raw
        .repository
        .owner
        .login
        .or(raw.repository.owner.name)
        .ok_or_else(|| ParseError::InvalidField {
            field: "repository.owner",
            value: "missing login and name".to_string(),
        })?;

    // The "after" SHA is all zeros for branch deletions; treat it as absent.
    let after = raw
        .after
        .as_deref()
        .filter(|s| s.chars().any(|c| c != '0'))
        .map(|s| parse_sha("after", s))
        .transpose()?;

    let parents_known = raw.commits.iter().all(|c| c.parents.is_some());

    let commits = raw
        .commits
        .into_iter()
        .map(convert_commit)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PushEvent {
        repo: RepoId::new(owner, raw.repository.name),
        ref_name: raw.ref_name,
        default_branch: raw.repository.default_branch,
        html_url: raw.repository.html_url,
        after,
        commits,
        parents_known,
    })
}

fn convert_commit(raw: RawPushCommit) -> Result<RawCommit, ParseError> {
    let id = parse_sha("commits[].id", &raw.id)?;

    let timestamp = DateTime::parse_from_rfc3339(&raw.timestamp)
        .map_err(|_| ParseError::InvalidField {
            field: "commits[].timestamp",
            value: raw.timestamp.clone(),
        })?
        .with_timezone(&Utc);

    let parents = raw
        .parents
        .unwrap_or_default()
        .iter()
        .map(|p| parse_sha("commits[].parents", p.as_str()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawCommit {
        id,
        message: raw.message,
        author: raw.author.name,
        timestamp,
        parents,
    })
}

fn parse_sha(field: &'static str, value: &str) -> Result<Sha, ParseError> {
    Sha::parse(value).map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}
