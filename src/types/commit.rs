//! Commit records before and after normalization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::Sha;

/// A commit as reported by the version-control provider.
///
/// Immutable once fetched. `parents` may be empty when the source (e.g. a push
/// payload) does not carry parent information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCommit {
    pub id: Sha,
    pub message: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub parents: Vec<Sha>,
}

impl RawCommit {
    /// Returns true if this commit has two or more parents.
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    /// Returns the first line of the message, trimmed.
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }
}

/// The closed set of change kinds a commit can be classified as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitKind {
    Feature,
    Fix,
    Docs,
    Chore,
    Refactor,
    Test,
    Other,
}

impl CommitKind {
    /// Maps a conventional-commit type token to a kind.
    ///
    /// Unrecognized tokens map to [`CommitKind::Other`].
    pub fn from_type_token(token: &str) -> Self {
        match token.to_ascii_lowercase().as_str() {
            "feat" | "feature" => CommitKind::Feature,
            "fix" => CommitKind::Fix,
            "docs" | "doc" => CommitKind::Docs,
            "chore" => CommitKind::Chore,
            "refactor" => CommitKind::Refactor,
            "test" | "tests" => CommitKind::Test,
            _ => CommitKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitKind::Feature => "feature",
            CommitKind::Fix => "fix",
            CommitKind::Docs => "docs",
            CommitKind::Chore => "chore",
            CommitKind::Refactor => "refactor",
            CommitKind::Test => "test",
            CommitKind::Other => "other",
        }
    }
}

impl fmt::Display for CommitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured, classified commit entry.
///
/// Serialized as-is into the synthesizer prompt, so field names are part of
/// the prompt contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedCommit {
    pub kind: CommitKind,
    pub scope: Option<String>,
    pub summary: String,
    pub breaking: bool,
    /// First 7 hex characters of the full commit SHA.
    pub short_id: String,
    pub author: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}
