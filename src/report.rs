//! Failure reporting and commit annotation.
//!
//! Both run on paths where something more important already happened (a
//! failed run, a finished publish), so neither ever returns an error. The
//! outcome says whether the write landed, which lets callers and tests tell
//! the degraded path apart without it masking anything.

use tracing::{debug, warn};

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::{RepoId, Sha};

/// Labels on upgrade notices.
pub const UPGRADE_LABELS: &[&str] = &["automation", "rate-limit"];

/// Labels on failure reports.
pub const FAILURE_LABELS: &[&str] = &["automation", "bug"];

pub const UPGRADE_TITLE: &str = "🚀 Upgrade to Pro for Unlimited Changelogs";

pub const FAILURE_TITLE: &str = "🤖 Changelog automation failed";

/// Result of a best-effort write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The issue or comment was created with this number/id.
    Delivered { id: u64 },
    /// The write failed; the reason was logged.
    Dropped { reason: String },
}

impl ReportOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReportOutcome::Delivered { .. })
    }
}

/// An issue ready to be filed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueReport {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

impl IssueReport {
    pub fn new(title: impl Into<String>, body: impl Into<String>, labels: &[&str]) -> Self {
        IssueReport {
            title: title.into(),
            body: body.into(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Where a repository can upgrade.
pub fn pricing_url(app_url: &str, repo: &RepoId) -> String {
    format!(
        "{}/pricing?installation_id={}:{}",
        app_url.trim_end_matches('/'),
        repo.owner,
        repo.repo
    )
}

/// The one-time notice posted when a free repository hits its limit.
pub fn upgrade_notice(repo: &RepoId, current: u64, limit: u64, app_url: Option<&str>) -> IssueReport {
    let mut body = format!(
        "## Monthly changelog limit reached\n\n\
         **Current Usage:** {current}/{limit} commits\n\n\
         This repository has used its free allowance for this month, so new pushes \
         are not being added to the changelog until the counter resets on the 1st.\n\n\
         ### Pro includes\n\
         - Unlimited commits per month\n\
         - Short release summaries posted on your commits\n\
         - Priority support\n"
    );
    if let Some(app_url) = app_url {
        body.push_str(&format!(
            "\n[Upgrade now →]({})\n",
            pricing_url(app_url, repo)
        ));
    }
    IssueReport::new(UPGRADE_TITLE, body, UPGRADE_LABELS)
}

/// The report filed when a run fails.
pub fn failure_report(error: &str) -> IssueReport {
    IssueReport::new(
        FAILURE_TITLE,
        format!(
            "The changelog could not be generated:\n\n```\n{}\n```\n\n\
             The triggering push was not modified. Pushing again retries.",
            error
        ),
        FAILURE_LABELS,
    )
}

/// Body of the comment that attaches a summary to the pushed commit.
pub fn summary_comment(summary: &str, changelog_url: Option<&str>) -> String {
    match changelog_url {
        Some(url) => format!(
            "📝 Changelog updated!\n\n{}\n\n[View full changelog →]({})",
            summary, url
        ),
        None => format!("📝 Changelog updated!\n\n{}", summary),
    }
}

/// Files `report` as an issue. Never fails.
pub async fn file_issue<G: GitHubInterpreter>(github: &G, report: IssueReport) -> ReportOutcome {
    let title = report.title.clone();
    let effect = GitHubEffect::CreateIssue {
        title: report.title,
        body: report.body,
        labels: report.labels,
    };

    match github.interpret(effect).await {
        Ok(GitHubResponse::IssueCreated { number }) => {
            debug!(number, title = %title, "Filed issue");
            ReportOutcome::Delivered { id: number }
        }
        Ok(other) => dropped(&title, format!("unexpected response: {}", other.variant_name())),
        Err(e) => dropped(&title, e.to_string()),
    }
}

/// Comments `body` on `sha`. Never fails.
pub async fn annotate_commit<G: GitHubInterpreter>(github: &G, sha: &Sha, body: String) -> ReportOutcome {
    let effect = GitHubEffect::CreateCommitComment {
        sha: sha.clone(),
        body,
    };

    match github.interpret(effect).await {
        Ok(GitHubResponse::CommitCommentCreated { id }) => {
            debug!(id, sha = %sha.short(), "Annotated commit");
            ReportOutcome::Delivered { id }
        }
        Ok(other) => dropped("commit comment", format!("unexpected response: {}", other.variant_name())),
        Err(e) => dropped("commit comment", e.to_string()),
    }
}

fn dropped(what: &str, reason: String) -> ReportOutcome {
    warn!(what, reason = %reason, "Best-effort write dropped");
    ReportOutcome::Dropped { reason }
}
