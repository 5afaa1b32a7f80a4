//! Webhook event types.
//!
//! Only `push` is processed. Every other event type parses to `None` and is
//! acknowledged without side effects.

use serde::{Deserialize, Serialize};

use crate::types::{RawCommit, RepoId, Sha};

/// Branches treated as primary when the payload does not name a default branch.
pub const FALLBACK_PRIMARY_BRANCHES: &[&str] = &["main", "master"];

/// A parsed webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GitHubEvent {
    /// Commits were pushed to a ref.
    Push(PushEvent),
}

impl GitHubEvent {
    /// Returns the repository this event belongs to.
    pub fn repo_id(&self) -> &RepoId {
        match self {
            GitHubEvent::Push(e) => &e.repo,
        }
    }
}

/// A push event with the fields the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    /// The repository.
    pub repo: RepoId,

    /// The full ref that was pushed, e.g. `refs/heads/main`.
    pub ref_name: String,

    /// The repository's default branch, if the payload carries it.
    pub default_branch: Option<String>,

    /// The repository's web URL, used for changelog links.
    pub html_url: Option<String>,

    /// The branch tip after the push, if present.
    pub after: Option<Sha>,

    /// Pushed commits, oldest first.
    pub commits: Vec<RawCommit>,

    /// True if every commit in the payload carried an explicit parent list.
    ///
    /// Push payloads normally omit parents, in which case merge detection
    /// needs the provider's commit listing.
    pub parents_known: bool,
}

impl PushEvent {
    /// Returns the branch name if the ref is a branch ref.
    pub fn branch(&self) -> Option<&str> {
        self.ref_name.strip_prefix("refs/heads/")
    }

    /// Returns true if the push targets the repository's primary branch.
    ///
    /// The primary branch is `default_branch` when known, otherwise `main`
    /// or `master`.
    pub fn targets_primary_branch(&self) -> bool {
        let Some(branch) = self.branch() else {
            return false;
        };

        match &self.default_branch {
            Some(default) => branch == default,
            None => FALLBACK_PRIMARY_BRANCHES.contains(&branch),
        }
    }

    /// Returns the last commit in the push.
    pub fn last_commit(&self) -> Option<&RawCommit> {
        self.commits.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(ref_name: &str, default_branch: Option<&str>) -> PushEvent {
        PushEvent {
            repo: RepoId::new("octocat", "hello-world"),
            ref_name: ref_name.to_string(),
            default_branch: default_branch.map(String::from),
            html_url: None,
            after: None,
            commits: vec![],
            parents_known: false,
        }
    }

    #[test]
    fn branch_strips_heads_prefix() {
        assert_eq!(push("refs/heads/main", None).branch(), Some("main"));
        assert_eq!(push("refs/tags/v1.0", None).branch(), None);
    }

    #[test]
    fn primary_branch_follows_default_branch() {
        assert!(push("refs/heads/trunk", Some("trunk")).targets_primary_branch());
        assert!(!push("refs/heads/main", Some("trunk")).targets_primary_branch());
    }

    #[test]
    fn primary_branch_falls_back_to_main_or_master() {
        assert!(push("refs/heads/main", None).targets_primary_branch());
        assert!(push("refs/heads/master", None).targets_primary_branch());
        assert!(!push("refs/heads/feature/x", None).targets_primary_branch());
    }

    #[test]
    fn branch_names_containing_main_are_not_primary() {
        assert!(!push("refs/heads/feature/main-menu", None).targets_primary_branch());
        assert!(!push("refs/heads/maintenance", None).targets_primary_branch());
    }

    #[test]
    fn tags_are_never_primary() {
        assert!(!push("refs/tags/main", None).targets_primary_branch());
    }
}
