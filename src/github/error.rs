//! GitHub API error types.
//!
//! Errors are categorised so callers can decide what to do without parsing
//! messages themselves:
//!
//! - **Transient**: 5xx, rate limits, network failures. Reported, not retried.
//! - **Permanent**: most 4xx, malformed responses. Reported.
//! - **NotFound**: 404. Callers that expect absence (reading a file that may
//!   not exist yet) handle it before it becomes an error.
//! - **RefConflict**: a ref update rejected because the branch moved. The
//!   publisher retries these from a fresh read.

use std::fmt;
use thiserror::Error;

/// The kind of GitHub API error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Server-side or network failure that might succeed later.
    Transient,

    /// Requires human intervention (bad credentials, missing permissions,
    /// validation failures, unexpected response shapes).
    Permanent,

    /// The addressed resource does not exist.
    NotFound,

    /// A ref update was rejected because it would not be a fast-forward from
    /// the current tip, i.e. another writer advanced the branch.
    RefConflict,
}

impl GitHubErrorKind {
    /// True if the provider was unreachable or overloaded.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A categorised GitHub API error.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    fn without_source(kind: GitHubErrorKind, status_code: Option<u16>, message: String) -> Self {
        Self {
            kind,
            status_code,
            message,
            source: None,
        }
    }

    /// Creates a permanent error without an octocrab source.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self::without_source(GitHubErrorKind::Permanent, None, message.into())
    }

    /// Creates a transient error without an octocrab source.
    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self::without_source(GitHubErrorKind::Transient, None, message.into())
    }

    /// Creates a not-found error without an octocrab source.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::without_source(GitHubErrorKind::NotFound, Some(404), message.into())
    }

    /// Creates a ref-conflict error for `branch` without an octocrab source.
    pub fn ref_conflict(branch: &str) -> Self {
        Self::without_source(
            GitHubErrorKind::RefConflict,
            Some(422),
            format!("update of refs/heads/{} is not a fast forward", branch),
        )
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == GitHubErrorKind::NotFound
    }

    pub fn is_ref_conflict(&self) -> bool {
        self.kind == GitHubErrorKind::RefConflict
    }

    /// Categorises an octocrab error.
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = extract_status_code(&err);
        let message = err.to_string();
        let kind = categorize(status_code, &message);

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }
}

/// Extracts the HTTP status code from an octocrab error, if present.
fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
    match err {
        octocrab::Error::GitHub { source, .. } => Some(source.status_code.as_u16()),
        _ => None,
    }
}

/// Maps a status code and message to an error kind.
///
/// This is a pure function extracted for testability.
pub fn categorize(status_code: Option<u16>, message: &str) -> GitHubErrorKind {
    match status_code {
        Some(404) => GitHubErrorKind::NotFound,
        Some(409 | 422) if is_ref_conflict_message(message) => GitHubErrorKind::RefConflict,
        Some(429) => GitHubErrorKind::Transient,
        Some(403) if is_rate_limit_error(message) => GitHubErrorKind::Transient,
        Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
        Some(_) => GitHubErrorKind::Permanent,
        None if is_network_error(message) => GitHubErrorKind::Transient,
        None => GitHubErrorKind::Permanent,
    }
}

/// Checks if an error message reports a rejected non-fast-forward ref update.
///
/// GitHub answers `PATCH /git/refs/...` with 422 "Update is not a fast forward"
/// when the ref moved since the caller read it.
pub fn is_ref_conflict_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("not a fast forward")
        || message_lower.contains("not a fast-forward")
        || message_lower.contains("reference update failed")
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}
