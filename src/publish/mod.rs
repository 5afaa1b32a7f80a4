//! Repository publisher: prepends a changelog section to the repository's
//! changelog file with one new commit on the primary branch.
//!
//! The write goes through git data primitives rather than the contents API so
//! that the new commit's parent is exactly the tip that was read:
//!
//! 1. Resolve the primary branch (once)
//! 2. Read the branch tip
//! 3. Read the changelog at that tip (absent is fine)
//! 4. Read the tip commit's tree
//! 5. Create a blob with the new full content
//! 6. Create a tree: the tip's tree with the changelog path replaced
//! 7. Create a commit with the tip as sole parent
//! 8. Move the branch to the new commit, without force
//!
//! Step 8 is the optimistic-concurrency checkpoint. If another push moved the
//! branch after step 2, the update is not a fast-forward and is rejected; the
//! whole sequence is then re-run from step 2 against the new tip, up to the
//! retry budget.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse, unexpected_response};
use crate::github::{GitHubApiError, RetryConfig, RetryResult, retry_with_backoff};
use crate::types::Sha;

pub mod content;

pub use content::{
    CHANGELOG_PREAMBLE, DEFAULT_CHANGELOG_PATH, PUBLISH_COMMIT_MESSAGE, compose_changelog,
};

/// Errors from a publish.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The branch kept moving under us for the whole retry budget.
    #[error("branch {branch} kept advancing; gave up after {attempts} attempts")]
    Conflict { branch: String, attempts: u32 },

    #[error(transparent)]
    GitHub(#[from] GitHubApiError),
}

impl PublishError {
    /// True if the provider was unreachable or overloaded.
    pub fn is_unavailable(&self) -> bool {
        match self {
            PublishError::Conflict { .. } => false,
            PublishError::GitHub(e) => e.kind.is_unavailable(),
        }
    }
}

/// A successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub branch: String,
    /// The new branch tip.
    pub commit: Sha,
    /// Blob SHA of the new file content.
    pub blob: Sha,
    /// Blob SHA of the content that was replaced, if the file existed.
    pub previous_blob: Option<Sha>,
    /// Tip the new commit was built on.
    pub parent: Sha,
    /// Number of attempts it took (1 unless the branch moved).
    pub attempts: u32,
}

/// Writes changelog sections to a repository.
#[derive(Debug, Clone)]
pub struct RepositoryPublisher {
    changelog_path: String,
    retry: RetryConfig,
}

impl Default for RepositoryPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_CHANGELOG_PATH)
    }
}

impl RepositoryPublisher {
    pub fn new(changelog_path: impl Into<String>) -> Self {
        RepositoryPublisher {
            changelog_path: changelog_path.into(),
            retry: RetryConfig::PUBLISH,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn changelog_path(&self) -> &str {
        &self.changelog_path
    }

    /// Prepends `section` to the changelog on the repository's default branch.
    pub async fn publish<G: GitHubInterpreter>(
        &self,
        github: &G,
        section: &str,
    ) -> Result<Published, PublishError> {
        let branch = default_branch(github).await?;
        self.publish_to(github, &branch, section).await
    }

    /// Prepends `section` to the changelog on `branch`.
    pub async fn publish_to<G: GitHubInterpreter>(
        &self,
        github: &G,
        branch: &str,
        section: &str,
    ) -> Result<Published, PublishError> {
        let result = retry_with_backoff(self.retry, GitHubApiError::is_ref_conflict, |attempt| {
            self.attempt(github, branch, section, attempt)
        })
        .await;

        match result {
            RetryResult::Success { value, .. } => {
                info!(
                    branch,
                    commit = %value.commit.short(),
                    attempts = value.attempts,
                    "Published changelog"
                );
                Ok(value)
            }
            RetryResult::ExhaustedRetries { attempts, .. } => {
                warn!(branch, attempts, "Giving up on publish, branch kept advancing");
                Err(PublishError::Conflict {
                    branch: branch.to_string(),
                    attempts,
                })
            }
            RetryResult::Failed(e) => Err(PublishError::GitHub(e)),
        }
    }

    /// One read-modify-write pass against the current tip.
    async fn attempt<G: GitHubInterpreter>(
        &self,
        github: &G,
        branch: &str,
        section: &str,
        attempt: u32,
    ) -> Result<Published, GitHubApiError> {
        let tip = branch_tip(github, branch).await?;
        debug!(branch, tip = %tip.short(), attempt, "Publishing against tip");

        let prior = read_file(github, &self.changelog_path, &tip).await?;
        let base_tree = commit_tree(github, &tip).await?;

        let content = compose_changelog(section, prior.as_ref().map(|(c, _)| c.as_str()));
        let blob = create_blob(github, content).await?;
        let tree = create_tree(github, &base_tree, &self.changelog_path, &blob).await?;
        let commit = create_commit(github, &tree, &tip).await?;

        match github
            .interpret(GitHubEffect::UpdateRef {
                branch: branch.to_string(),
                sha: commit.clone(),
            })
            .await?
        {
            GitHubResponse::RefUpdated => {}
            other => return Err(unexpected_response("update_ref", &other)),
        }

        Ok(Published {
            branch: branch.to_string(),
            commit,
            blob,
            previous_blob: prior.map(|(_, sha)| sha),
            parent: tip,
            attempts: attempt,
        })
    }
}

// ─── Effect Helpers ───────────────────────────────────────────────────────────

async fn default_branch<G: GitHubInterpreter>(github: &G) -> Result<String, GitHubApiError> {
    match github.interpret(GitHubEffect::GetDefaultBranch).await? {
        GitHubResponse::DefaultBranch(branch) => Ok(branch),
        other => Err(unexpected_response("get_default_branch", &other)),
    }
}

async fn branch_tip<G: GitHubInterpreter>(github: &G, branch: &str) -> Result<Sha, GitHubApiError> {
    match github
        .interpret(GitHubEffect::GetRef {
            branch: branch.to_string(),
        })
        .await?
    {
        GitHubResponse::Ref { sha } => Ok(sha),
        other => Err(unexpected_response("get_ref", &other)),
    }
}

/// Returns the file's content and blob SHA at `at`, or `None` if absent.
async fn read_file<G: GitHubInterpreter>(
    github: &G,
    path: &str,
    at: &Sha,
) -> Result<Option<(String, Sha)>, GitHubApiError> {
    match github
        .interpret(GitHubEffect::GetFileContent {
            path: path.to_string(),
            at: at.to_string(),
        })
        .await?
    {
        GitHubResponse::FileContent(file) => Ok(Some((file.content, file.sha))),
        GitHubResponse::FileAbsent => Ok(None),
        other => Err(unexpected_response("get_file_content", &other)),
    }
}

async fn commit_tree<G: GitHubInterpreter>(github: &G, sha: &Sha) -> Result<Sha, GitHubApiError> {
    match github
        .interpret(GitHubEffect::GetCommit { sha: sha.clone() })
        .await?
    {
        GitHubResponse::Commit(commit) => Ok(commit.tree),
        other => Err(unexpected_response("get_commit", &other)),
    }
}

async fn create_blob<G: GitHubInterpreter>(github: &G, content: String) -> Result<Sha, GitHubApiError> {
    match github.interpret(GitHubEffect::CreateBlob { content }).await? {
        GitHubResponse::BlobCreated { sha } => Ok(sha),
        other => Err(unexpected_response("create_blob", &other)),
    }
}

async fn create_tree<G: GitHubInterpreter>(
    github: &G,
    base_tree: &Sha,
    path: &str,
    blob: &Sha,
) -> Result<Sha, GitHubApiError> {
    match github
        .interpret(GitHubEffect::CreateTree {
            base_tree: base_tree.clone(),
            path: path.to_string(),
            blob: blob.clone(),
        })
        .await?
    {
        GitHubResponse::TreeCreated { sha } => Ok(sha),
        other => Err(unexpected_response("create_tree", &other)),
    }
}

async fn create_commit<G: GitHubInterpreter>(
    github: &G,
    tree: &Sha,
    parent: &Sha,
) -> Result<Sha, GitHubApiError> {
    match github
        .interpret(GitHubEffect::CreateCommit {
            message: PUBLISH_COMMIT_MESSAGE.to_string(),
            tree: tree.clone(),
            parent: parent.clone(),
        })
        .await?
    {
        GitHubResponse::CommitCreated { sha } => Ok(sha),
        other => Err(unexpected_response("create_commit", &other)),
    }
}
