//! GitHub effect interpreter using octocrab.
//!
//! Git data operations (blobs, trees, commits, refs) go through octocrab's
//! raw REST routes; issues and file contents use its typed builders.
//!
//! Calls are not retried here. Each is bounded by the client's timeouts and
//! failures are categorised by [`GitHubApiError::from_octocrab`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::effects::{CommitData, FileContent, GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::{RawCommit, Sha};

use super::client::OctocrabClient;
use super::error::GitHubApiError;

/// File mode for a regular, non-executable file in a git tree.
const REGULAR_FILE_MODE: &str = "100644";

impl GitHubInterpreter for OctocrabClient {
    async fn interpret(&self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        tracing::debug!(repo = %self.repo(), effect = effect.name(), "Executing GitHub effect");
        execute_effect(self, effect).await
    }
}

async fn execute_effect(
    client: &OctocrabClient,
    effect: GitHubEffect,
) -> Result<GitHubResponse, GitHubApiError> {
    match effect {
        GitHubEffect::GetDefaultBranch => get_default_branch(client).await,
        GitHubEffect::GetRef { branch } => get_ref(client, &branch).await,
        GitHubEffect::GetCommit { sha } => get_commit(client, &sha).await,
        GitHubEffect::GetFileContent { path, at } => get_file_content(client, &path, &at).await,
        GitHubEffect::ListRecentCommits { branch, limit } => {
            list_recent_commits(client, &branch, limit).await
        }
        GitHubEffect::CreateBlob { content } => create_blob(client, &content).await,
        GitHubEffect::CreateTree {
            base_tree,
            path,
            blob,
        } => create_tree(client, &base_tree, &path, &blob).await,
        GitHubEffect::CreateCommit {
            message,
            tree,
            parent,
        } => create_commit(client, &message, &tree, &parent).await,
        GitHubEffect::UpdateRef { branch, sha } => update_ref(client, &branch, &sha).await,
        GitHubEffect::CreateIssue {
            title,
            body,
            labels,
        } => create_issue(client, title, body, labels).await,
        GitHubEffect::CreateCommitComment { sha, body } => {
            create_commit_comment(client, &sha, body).await
        }
    }
}

fn parse_sha(field: &str, value: &str) -> Result<Sha, GitHubApiError> {
    Sha::parse(value).map_err(|e| {
        GitHubApiError::permanent_without_source(format!("Invalid {} in response: {}", field, e))
    })
}

// ─── Shared Wire Types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

// ─── Repository Queries ───────────────────────────────────────────────────────

async fn get_default_branch(client: &OctocrabClient) -> Result<GitHubResponse, GitHubApiError> {
    let repo = client
        .inner()
        .repos(client.owner(), client.repo_name())
        .get()
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::DefaultBranch(
        repo.default_branch.unwrap_or_else(|| "main".to_string()),
    ))
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: ShaOnly,
}

async fn get_ref(client: &OctocrabClient, branch: &str) -> Result<GitHubResponse, GitHubApiError> {
    let url = client.route(&format!("git/ref/heads/{}", branch));
    let response: RefResponse = client
        .inner()
        .get(&url, None::<&()>)
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::Ref {
        sha: parse_sha("ref object sha", &response.object.sha)?,
    })
}

#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    sha: String,
    tree: ShaOnly,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

async fn get_commit(client: &OctocrabClient, sha: &Sha) -> Result<GitHubResponse, GitHubApiError> {
    let url = client.route(&format!("git/commits/{}", sha));
    let response: GitCommitResponse = client
        .inner()
        .get(&url, None::<&()>)
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::Commit(CommitData {
        sha: parse_sha("commit sha", &response.sha)?,
        tree: parse_sha("tree sha", &response.tree.sha)?,
        parents: response
            .parents
            .iter()
            .map(|p| parse_sha("parent sha", &p.sha))
            .collect::<Result<_, _>>()?,
    }))
}

async fn get_file_content(
    client: &OctocrabClient,
    path: &str,
    at: &str,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .repos(client.owner(), client.repo_name())
        .get_content()
        .path(path)
        .r#ref(at)
        .send()
        .await;

    let items = match result {
        Ok(items) => items,
        Err(e) => {
            let err = GitHubApiError::from_octocrab(e);
            if err.is_not_found() {
                return Ok(GitHubResponse::FileAbsent);
            }
            return Err(err);
        }
    };

    let item = items.items.into_iter().next().ok_or_else(|| {
        GitHubApiError::permanent_without_source(format!("{} is not a file", path))
    })?;

    let content = item.decoded_content().ok_or_else(|| {
        GitHubApiError::permanent_without_source(format!(
            "{} has no decodable UTF-8 content",
            path
        ))
    })?;

    Ok(GitHubResponse::FileContent(FileContent {
        content,
        sha: parse_sha("content sha", &item.sha)?,
    }))
}

#[derive(Debug, Serialize)]
struct ListCommitsQuery<'a> {
    sha: &'a str,
    per_page: u32,
}

/// One entry of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Deserialize)]
struct CommitListItem {
    sha: String,
    commit: CommitDetails,
    #[serde(default)]
    parents: Vec<ShaOnly>,
}

#[derive(Debug, Deserialize)]
struct CommitDetails {
    message: String,
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    name: String,
    date: DateTime<Utc>,
}

impl CommitListItem {
    fn into_raw_commit(self) -> Result<RawCommit, GitHubApiError> {
        let author = self.commit.author.ok_or_else(|| {
            GitHubApiError::permanent_without_source(format!("commit {} has no author", self.sha))
        })?;

        Ok(RawCommit {
            id: parse_sha("commit sha", &self.sha)?,
            message: self.commit.message,
            author: author.name,
            timestamp: author.date,
            parents: self
                .parents
                .iter()
                .map(|p| parse_sha("parent sha", &p.sha))
                .collect::<Result<_, _>>()?,
        })
    }
}

async fn list_recent_commits(
    client: &OctocrabClient,
    branch: &str,
    limit: u32,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = client.route("commits");
    let query = ListCommitsQuery {
        sha: branch,
        per_page: limit.clamp(1, 100),
    };

    let items: Vec<CommitListItem> = client
        .inner()
        .get(&url, Some(&query))
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    let commits = items
        .into_iter()
        .map(CommitListItem::into_raw_commit)
        .collect::<Result<_, _>>()?;

    Ok(GitHubResponse::RecentCommits(commits))
}

// ─── Git Data Mutations ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct CreateBlobRequest<'a> {
    content: &'a str,
    encoding: &'static str,
}

async fn create_blob(client: &OctocrabClient, content: &str) -> Result<GitHubResponse, GitHubApiError> {
    let request = CreateBlobRequest {
        content,
        encoding: "utf-8",
    };
    let response: ShaOnly = client
        .inner()
        .post(client.route("git/blobs"), Some(&request))
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::BlobCreated {
        sha: parse_sha("blob sha", &response.sha)?,
    })
}

#[derive(Debug, Serialize)]
struct CreateTreeRequest<'a> {
    base_tree: &'a str,
    tree: [TreeEntry<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TreeEntry<'a> {
    path: &'a str,
    mode: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    sha: &'a str,
}

fn tree_request<'a>(base_tree: &'a Sha, path: &'a str, blob: &'a Sha) -> CreateTreeRequest<'a> {
    CreateTreeRequest {
        base_tree: base_tree.as_str(),
        tree: [TreeEntry {
            path,
            mode: REGULAR_FILE_MODE,
            kind: "blob",
            sha: blob.as_str(),
        }],
    }
}

async fn create_tree(
    client: &OctocrabClient,
    base_tree: &Sha,
    path: &str,
    blob: &Sha,
) -> Result<GitHubResponse, GitHubApiError> {
    let response: ShaOnly = client
        .inner()
        .post(client.route("git/trees"), Some(&tree_request(base_tree, path, blob)))
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::TreeCreated {
        sha: parse_sha("tree sha", &response.sha)?,
    })
}

#[derive(Debug, Serialize)]
struct CreateCommitRequest<'a> {
    message: &'a str,
    tree: &'a str,
    parents: [&'a str; 1],
}

async fn create_commit(
    client: &OctocrabClient,
    message: &str,
    tree: &Sha,
    parent: &Sha,
) -> Result<GitHubResponse, GitHubApiError> {
    let request = CreateCommitRequest {
        message,
        tree: tree.as_str(),
        parents: [parent.as_str()],
    };
    let response: ShaOnly = client
        .inner()
        .post(client.route("git/commits"), Some(&request))
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::CommitCreated {
        sha: parse_sha("commit sha", &response.sha)?,
    })
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

async fn update_ref(
    client: &OctocrabClient,
    branch: &str,
    sha: &Sha,
) -> Result<GitHubResponse, GitHubApiError> {
    let request = UpdateRefRequest {
        sha: sha.as_str(),
        force: false,
    };
    let result: Result<serde_json::Value, _> = client
        .inner()
        .patch(client.route(&format!("git/refs/heads/{}", branch)), Some(&request))
        .await;

    match result {
        Ok(_) => Ok(GitHubResponse::RefUpdated),
        Err(e) => {
            let err = GitHubApiError::from_octocrab(e);
            if err.is_ref_conflict() {
                tracing::debug!(branch, sha = %sha.short(), "Ref update rejected, branch moved");
            }
            Err(err)
        }
    }
}

// ─── Issues & Comments ────────────────────────────────────────────────────────

async fn create_issue(
    client: &OctocrabClient,
    title: String,
    body: String,
    labels: Vec<String>,
) -> Result<GitHubResponse, GitHubApiError> {
    let issue = client
        .inner()
        .issues(client.owner(), client.repo_name())
        .create(title)
        .body(body)
        .labels(labels)
        .send()
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::IssueCreated {
        number: issue.number,
    })
}

#[derive(Debug, Serialize)]
struct CommitCommentRequest {
    body: String,
}

#[derive(Debug, Deserialize)]
struct CommitCommentResponse {
    id: u64,
}

async fn create_commit_comment(
    client: &OctocrabClient,
    sha: &Sha,
    body: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let response: CommitCommentResponse = client
        .inner()
        .post(
            client.route(&format!("commits/{}/comments", sha)),
            Some(&CommitCommentRequest { body }),
        )
        .await
        .map_err(GitHubApiError::from_octocrab)?;

    Ok(GitHubResponse::CommitCommentCreated { id: response.id })
}
