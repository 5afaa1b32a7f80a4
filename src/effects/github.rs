//! GitHub API effect types.
//!
//! These types describe GitHub API operations as data, without executing them.
//! The interpreter in `crate::github` executes them against the real API;
//! tests execute them against an in-memory fake.

use serde::{Deserialize, Serialize};

use crate::types::{RawCommit, Sha};

/// A GitHub API effect.
///
/// Effects are repo-scoped: the interpreter is constructed with a `RepoId`,
/// so effects don't include it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GitHubEffect {
    // ─── Repository Queries ───────────────────────────────────────────────────
    /// Look up the repository's default branch name.
    GetDefaultBranch,

    /// Resolve a branch to its tip commit.
    GetRef { branch: String },

    /// Fetch a commit object (for its tree).
    GetCommit { sha: Sha },

    /// Read a file's content and blob SHA at a branch or commit.
    GetFileContent { path: String, at: String },

    /// List the most recent commits on a branch, newest first.
    ListRecentCommits { branch: String, limit: u32 },

    // ─── Git Data Mutations ───────────────────────────────────────────────────
    /// Store `content` as a UTF-8 blob.
    CreateBlob { content: String },

    /// Create a tree that is `base_tree` with `path` pointing at `blob`.
    CreateTree {
        base_tree: Sha,
        path: String,
        blob: Sha,
    },

    /// Create a commit with a single parent.
    CreateCommit {
        message: String,
        tree: Sha,
        parent: Sha,
    },

    /// Move a branch to `sha`.
    ///
    /// Never forced: the update is rejected unless `sha` descends from the
    /// current tip, which is what makes the publish sequence safe under
    /// concurrent writers.
    UpdateRef { branch: String, sha: Sha },

    // ─── Issues & Comments ────────────────────────────────────────────────────
    /// Open an issue.
    CreateIssue {
        title: String,
        body: String,
        labels: Vec<String>,
    },

    /// Comment on a commit.
    CreateCommitComment { sha: Sha, body: String },
}

impl GitHubEffect {
    /// Stable snake_case name, for logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            GitHubEffect::GetDefaultBranch => "get_default_branch",
            GitHubEffect::GetRef { .. } => "get_ref",
            GitHubEffect::GetCommit { .. } => "get_commit",
            GitHubEffect::GetFileContent { .. } => "get_file_content",
            GitHubEffect::ListRecentCommits { .. } => "list_recent_commits",
            GitHubEffect::CreateBlob { .. } => "create_blob",
            GitHubEffect::CreateTree { .. } => "create_tree",
            GitHubEffect::CreateCommit { .. } => "create_commit",
            GitHubEffect::UpdateRef { .. } => "update_ref",
            GitHubEffect::CreateIssue { .. } => "create_issue",
            GitHubEffect::CreateCommitComment { .. } => "create_commit_comment",
        }
    }

    /// True if executing this effect changes repository state.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            GitHubEffect::CreateBlob { .. }
                | GitHubEffect::CreateTree { .. }
                | GitHubEffect::CreateCommit { .. }
                | GitHubEffect::UpdateRef { .. }
                | GitHubEffect::CreateIssue { .. }
                | GitHubEffect::CreateCommitComment { .. }
        )
    }
}

// ─── Response Types ───────────────────────────────────────────────────────────

/// A file's decoded content and blob SHA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContent {
    pub content: String,
    /// The blob SHA, used to detect whether the file changed.
    pub sha: Sha,
}

/// The parts of a commit object the publisher needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    pub sha: Sha,
    pub tree: Sha,
    pub parents: Vec<Sha>,
}

/// Response from a GitHub effect.
///
/// Each variant corresponds to the response from a particular effect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GitHubResponse {
    /// Response to `GetDefaultBranch`.
    DefaultBranch(String),

    /// Response to `GetRef`.
    Ref { sha: Sha },

    /// Response to `GetCommit`.
    Commit(CommitData),

    /// Response to `GetFileContent` when the file exists.
    FileContent(FileContent),

    /// Response to `GetFileContent` when the file does not exist (HTTP 404).
    FileAbsent,

    /// Response to `ListRecentCommits`.
    RecentCommits(Vec<RawCommit>),

    /// Response to `CreateBlob`.
    BlobCreated { sha: Sha },

    /// Response to `CreateTree`.
    TreeCreated { sha: Sha },

    /// Response to `CreateCommit`.
    CommitCreated { sha: Sha },

    /// Response to `UpdateRef`.
    RefUpdated,

    /// Response to `CreateIssue`.
    IssueCreated { number: u64 },

    /// Response to `CreateCommitComment`.
    CommitCommentCreated { id: u64 },
}

impl GitHubResponse {
    /// Short variant name for error messages.
    pub fn variant_name(&self) -> &'static str {
        match self {
            GitHubResponse::DefaultBranch(_) => "default_branch",
            GitHubResponse::Ref { .. } => "ref",
            GitHubResponse::Commit(_) => "commit",
            GitHubResponse::FileContent(_) => "file_content",
            GitHubResponse::FileAbsent => "file_absent",
            GitHubResponse::RecentCommits(_) => "recent_commits",
            GitHubResponse::BlobCreated { .. } => "blob_created",
            GitHubResponse::TreeCreated { .. } => "tree_created",
            GitHubResponse::CommitCreated { .. } => "commit_created",
            GitHubResponse::RefUpdated => "ref_updated",
            GitHubResponse::IssueCreated { .. } => "issue_created",
            GitHubResponse::CommitCommentCreated { .. } => "commit_comment_created",
        }
    }
}
