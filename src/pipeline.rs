//! Push-to-changelog orchestration.
//!
//! One delivery drives one sequential run:
//!
//! ```text
//! verify signature → parse → branch filter → skip marker
//!   → quota gate → normalize → synthesize → publish → record usage → annotate
//! ```
//!
//! Everything before the quota gate is free and side-effect free, so rejected
//! traffic never reaches the generative backend or the repository. Failures
//! after the gate are reported as an issue on the repository (best-effort)
//! and then returned to the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::commits::{contains_skip_marker, normalize};
use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse, InterpreterFactory};
use crate::llm::{
    ChangelogDraft, ChangelogSynthesizer, GenerationError, SynthesisOptions, TextBackend,
    ValidationIssue, changelog_url,
};
use crate::publish::{PublishError, RepositoryPublisher};
use crate::quota::{CounterStore, QuotaStatus, QuotaTracker, StoreError};
use crate::report::{
    ReportOutcome, annotate_commit, failure_report, file_issue, pricing_url, summary_comment,
    upgrade_notice,
};
use crate::types::{DeliveryId, PlanTier, RawCommit, RepoId, Sha};
use crate::webhooks::{
    GitHubEvent, ParseError, PushEvent, SignatureCheck, check_signature, parse_webhook,
};

/// Upper bound on commits fetched to recover parent lists.
const MAX_ENRICHMENT_COMMITS: u32 = 100;

/// An inbound webhook delivery.
#[derive(Debug, Clone, Copy)]
pub struct Delivery<'a> {
    /// The `X-GitHub-Event` header.
    pub event_type: &'a str,
    /// The `X-Hub-Signature-256` header, if sent.
    pub signature: Option<&'a str>,
    /// The `X-GitHub-Delivery` header, if sent.
    pub delivery_id: Option<&'a DeliveryId>,
    /// The raw body, exactly as received.
    pub body: &'a [u8],
}

/// Why a delivery was acknowledged without doing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a push.
    EventType(String),
    /// A push to something other than the primary branch.
    Branch(String),
    /// A push without commits (a branch deletion or tag move).
    NoCommits,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::EventType(event) => write!(f, "Event type '{}' is not processed", event),
            IgnoreReason::Branch(ref_name) => {
                write!(f, "Push to {} is not on the primary branch", ref_name)
            }
            IgnoreReason::NoCommits => f.write_str("Push contains no commits"),
        }
    }
}

/// A completed publish.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    pub repo: RepoId,
    /// Commits that survived normalization and were charged.
    pub commits_processed: u64,
    pub plan: PlanTier,
    /// Remaining allowance after this run; `None` for unlimited plans.
    pub remaining: Option<u64>,
    pub includes_summary: bool,
    /// The new tip of the primary branch.
    pub commit_sha: Sha,
    /// Soft validation findings on the published draft.
    pub validation_issues: Vec<ValidationIssue>,
    /// Whether the summary comment landed. `None` when there was no summary.
    pub annotation: Option<ReportOutcome>,
    /// False if publishing succeeded but recording usage failed.
    pub usage_recorded: bool,
}

/// Result of a run that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Ignored(IgnoreReason),
    /// The last commit carried a skip marker.
    Skipped,
    /// Every commit was excluded during normalization.
    NoSignificantCommits,
    Published(PublishSummary),
}

/// Errors from a run.
///
/// Variants raised after the quota gate carry the outcome of the failure
/// report filed for them.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("webhook signature is missing or invalid")]
    Authentication,

    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] ParseError),

    #[error("monthly limit reached: {current}/{limit} commits on the {plan} plan")]
    QuotaExceeded {
        plan: PlanTier,
        current: u64,
        limit: u64,
        upgrade_url: Option<String>,
        /// `None` if the notice was already posted this month.
        notice: Option<ReportOutcome>,
    },

    #[error("quota store failed: {source}")]
    Store {
        #[source]
        source: StoreError,
        report: ReportOutcome,
    },

    #[error("changelog generation failed: {source}")]
    Generation {
        #[source]
        source: GenerationError,
        report: ReportOutcome,
    },

    #[error("publishing the changelog failed: {source}")]
    Publish {
        #[source]
        source: PublishError,
        report: ReportOutcome,
    },
}

impl PipelineError {
    /// True if a dependency was unreachable rather than misbehaving.
    pub fn is_unavailable(&self) -> bool {
        match self {
            PipelineError::Generation { source, .. } => source.is_unavailable(),
            PipelineError::Publish { source, .. } => source.is_unavailable(),
            _ => false,
        }
    }

    /// The failure report filed for this error, if one was attempted.
    pub fn report(&self) -> Option<&ReportOutcome> {
        match self {
            PipelineError::Store { report, .. }
            | PipelineError::Generation { report, .. }
            | PipelineError::Publish { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Failures after the gate, before they are reported.
#[derive(Debug, Error)]
enum StageError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl StageError {
    fn into_pipeline_error(self, report: ReportOutcome) -> PipelineError {
        match self {
            StageError::Store(source) => PipelineError::Store { source, report },
            StageError::Generation(source) => PipelineError::Generation { source, report },
            StageError::Publish(source) => PipelineError::Publish { source, report },
        }
    }
}

/// Settings that are not dependencies.
#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    /// Shared webhook secret. `None` disables verification.
    pub webhook_secret: Option<Vec<u8>>,
    /// Base URL of the hosted app, for upgrade links.
    pub app_url: Option<String>,
}

/// The orchestrator. Holds every collaborator as an explicit dependency.
#[derive(Debug)]
pub struct Pipeline<F, B, S> {
    github: F,
    synthesizer: ChangelogSynthesizer<B>,
    quota: QuotaTracker<S>,
    publisher: RepositoryPublisher,
    settings: PipelineSettings,
}

impl<F, B, S> Pipeline<F, B, S>
where
    F: InterpreterFactory,
    B: TextBackend,
    S: CounterStore,
{
    pub fn new(
        github: F,
        synthesizer: ChangelogSynthesizer<B>,
        quota: QuotaTracker<S>,
        publisher: RepositoryPublisher,
        settings: PipelineSettings,
    ) -> Self {
        Pipeline {
            github,
            synthesizer,
            quota,
            publisher,
            settings,
        }
    }

    pub fn github(&self) -> &F {
        &self.github
    }

    pub fn synthesizer(&self) -> &ChangelogSynthesizer<B> {
        &self.synthesizer
    }

    pub fn quota(&self) -> &QuotaTracker<S> {
        &self.quota
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn handle(&self, delivery: Delivery<'_>) -> Result<PushOutcome, PipelineError> {
        self.handle_at(delivery, Utc::now()).await
    }

    /// Runs one delivery as of `now`.
    pub async fn handle_at(
        &self,
        delivery: Delivery<'_>,
        now: DateTime<Utc>,
    ) -> Result<PushOutcome, PipelineError> {
        let delivery_id = delivery.delivery_id.map(DeliveryId::as_str).unwrap_or("-");

        match check_signature(
            delivery.body,
            delivery.signature,
            self.settings.webhook_secret.as_deref(),
        ) {
            SignatureCheck::Verified => {}
            SignatureCheck::Skipped => {
                warn!(delivery_id, "No webhook secret configured, skipping signature verification");
            }
            SignatureCheck::Rejected => {
                warn!(delivery_id, event = delivery.event_type, "Rejected webhook signature");
                return Err(PipelineError::Authentication);
            }
        }

        let push = match parse_webhook(delivery.event_type, delivery.body)? {
            Some(GitHubEvent::Push(push)) => push,
            None => {
                debug!(delivery_id, event = delivery.event_type, "Ignoring event");
                return Ok(PushOutcome::Ignored(IgnoreReason::EventType(
                    delivery.event_type.to_string(),
                )));
            }
        };

        debug!(
            delivery_id,
            repo = %push.repo,
            ref_name = %push.ref_name,
            commits = push.commits.len(),
            "Received push"
        );

        if !push.targets_primary_branch() {
            return Ok(PushOutcome::Ignored(IgnoreReason::Branch(push.ref_name)));
        }

        let Some(last) = push.last_commit() else {
            return Ok(PushOutcome::Ignored(IgnoreReason::NoCommits));
        };

        if contains_skip_marker(&last.message) {
            debug!(repo = %push.repo, sha = %last.id.short(), "Last commit carries a skip marker");
            return Ok(PushOutcome::Skipped);
        }

        let github = self.github.for_repo(&push.repo);

        let status = match self.quota.check_limit_at(&push.repo, now).await {
            Ok(status) => status,
            Err(e) => return Err(self.fail(&github, &push.repo, StageError::Store(e)).await),
        };

        if !status.allowed {
            return Err(self.deny(&github, &push.repo, &status, now).await);
        }

        match self.run(&github, push, &status, now).await {
            Ok(outcome) => Ok(outcome),
            Err((repo, e)) => Err(self.fail(&github, &repo, e).await),
        }
    }

    /// Stages after the gate. Errors carry the repository for reporting.
    async fn run<G: GitHubInterpreter>(
        &self,
        github: &G,
        push: PushEvent,
        status: &QuotaStatus,
        now: DateTime<Utc>,
    ) -> Result<PushOutcome, (RepoId, StageError)> {
        let branch = push.branch().unwrap_or_default().to_string();
        let last_sha = push.commits.last().map(|c| c.id.clone());

        let commits = if push.parents_known {
            push.commits
        } else {
            enrich_parents(github, &branch, push.commits).await
        };

        let normalized = normalize(&commits);
        if normalized.is_empty() {
            debug!(repo = %push.repo, "No significant commits after normalization");
            return Ok(PushOutcome::NoSignificantCommits);
        }

        let options = SynthesisOptions {
            include_summary: status.plan == PlanTier::Pro,
            repository_url: push.html_url.clone(),
            branch: Some(branch.clone()),
        };

        let draft = self
            .synthesizer
            .generate_at(&normalized, &options, now)
            .await
            .map_err(|e| (push.repo.clone(), StageError::from(e)))?;

        let published = self
            .publisher
            .publish_to(github, &branch, &draft.markdown)
            .await
            .map_err(|e| (push.repo.clone(), StageError::from(e)))?;

        let processed = normalized.len() as u64;
        let usage_recorded = match self.quota.increment_at(&push.repo, processed, now).await {
            Ok(total) => {
                debug!(repo = %push.repo, total, "Recorded usage");
                true
            }
            Err(e) => {
                error!(repo = %push.repo, error = %e, "Published but failed to record usage");
                false
            }
        };

        let annotation = match (draft.summary.text(), &last_sha) {
            (Some(summary), Some(sha)) => {
                let url = push
                    .html_url
                    .as_deref()
                    .map(|u| changelog_url(u, &published.branch, self.publisher.changelog_path()));
                Some(annotate_commit(github, sha, summary_comment(summary, url.as_deref())).await)
            }
            _ => None,
        };

        info!(
            repo = %push.repo,
            commits = processed,
            commit = %published.commit.short(),
            "Changelog updated"
        );

        Ok(PushOutcome::Published(summarize(
            push.repo,
            status,
            processed,
            draft,
            published.commit,
            annotation,
            usage_recorded,
        )))
    }

    /// Builds the quota error, posting the upgrade notice once per month.
    async fn deny<G: GitHubInterpreter>(
        &self,
        github: &G,
        repo: &RepoId,
        status: &QuotaStatus,
        now: DateTime<Utc>,
    ) -> PipelineError {
        let limit = status.limit.unwrap_or(self.quota.free_limit());
        warn!(repo = %repo, current = status.current, limit, "Monthly limit reached");

        let notice = match self.quota.claim_upgrade_notice_at(repo, now).await {
            Ok(true) => {
                let notice =
                    upgrade_notice(repo, status.current, limit, self.settings.app_url.as_deref());
                Some(file_issue(github, notice).await)
            }
            Ok(false) => None,
            Err(e) => {
                warn!(repo = %repo, error = %e, "Could not claim upgrade notice");
                None
            }
        };

        PipelineError::QuotaExceeded {
            plan: status.plan,
            current: status.current,
            limit,
            upgrade_url: self
                .settings
                .app_url
                .as_deref()
                .map(|app_url| pricing_url(app_url, repo)),
            notice,
        }
    }

    /// Reports a stage failure on the repository and wraps it.
    async fn fail<G: GitHubInterpreter>(
        &self,
        github: &G,
        repo: &RepoId,
        e: StageError,
    ) -> PipelineError {
        error!(repo = %repo, error = %e, "Changelog run failed");
        let report = file_issue(github, failure_report(&e.to_string())).await;
        e.into_pipeline_error(report)
    }
}

fn summarize(
    repo: RepoId,
    status: &QuotaStatus,
    processed: u64,
    draft: ChangelogDraft,
    commit_sha: Sha,
    annotation: Option<ReportOutcome>,
    usage_recorded: bool,
) -> PublishSummary {
    PublishSummary {
        repo,
        commits_processed: processed,
        plan: status.plan,
        remaining: status.remaining.map(|r| r.saturating_sub(processed)),
        includes_summary: draft.summary.text().is_some(),
        commit_sha,
        validation_issues: draft.issues,
        annotation,
        usage_recorded,
    }
}

/// Fills in missing parent lists from the branch's recent history.
///
/// Push payloads usually omit parents, which hides merge commits from the
/// normalizer. A failed lookup leaves the commits as they were.
async fn enrich_parents<G: GitHubInterpreter>(
    github: &G,
    branch: &str,
    commits: Vec<RawCommit>,
) -> Vec<RawCommit> {
    let limit = (commits.len() as u32).clamp(1, MAX_ENRICHMENT_COMMITS);
    let effect = GitHubEffect::ListRecentCommits {
        branch: branch.to_string(),
        limit,
    };

    let recent = match github.interpret(effect).await {
        Ok(GitHubResponse::RecentCommits(recent)) => recent,
        Ok(other) => {
            warn!(response = other.variant_name(), "Unexpected response listing commits");
            return commits;
        }
        Err(e) => {
            warn!(branch, error = %e, "Could not list recent commits, using payload as-is");
            return commits;
        }
    };

    let parents: HashMap<Sha, Vec<Sha>> = recent.into_iter().map(|c| (c.id, c.parents)).collect();
    commits
        .into_iter()
        .map(|mut commit| {
            if commit.parents.is_empty() {
                if let Some(known) = parents.get(&commit.id) {
                    commit.parents = known.clone();
                }
            }
            commit
        })
        .collect()
}
