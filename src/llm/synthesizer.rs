//! Changelog synthesis: normalized commits in, validated markdown out.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::backend::{GenerationError, GenerationRequest, TextBackend};
use super::markdown::{ValidationIssue, clean_markdown, truncate_chars, validate_changelog};
use crate::commits::filter_trivial;
use crate::types::NormalizedCommit;

/// System instruction for the changelog call.
pub const CHANGELOG_PROMPT: &str = include_str!("prompts/changelog.txt");

/// System instruction for the short-form summary call.
pub const SUMMARY_PROMPT: &str = include_str!("prompts/summary.txt");

pub const CHANGELOG_MAX_TOKENS: u32 = 2000;
pub const CHANGELOG_TEMPERATURE: f32 = 0.3;
pub const SUMMARY_MAX_TOKENS: u32 = 300;
pub const SUMMARY_TEMPERATURE: f32 = 0.5;

/// Hard ceiling on summary length, in characters.
pub const SUMMARY_MAX_CHARS: usize = 240;

/// Used when the summary call fails.
pub const FALLBACK_SUMMARY: &str = "🚀 New release just shipped! Check out the latest changes.";

/// Body of the draft produced when every commit was trivial.
pub const NO_SIGNIFICANT_CHANGES: &str = "No significant changes in this release.";

/// Per-call options for [`ChangelogSynthesizer::generate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SynthesisOptions {
    /// Request a short-form summary as well (pro plans).
    pub include_summary: bool,
    /// Web URL of the repository, used to link the changelog from the summary.
    pub repository_url: Option<String>,
    /// Branch the changelog lives on. Defaults to `main` in links.
    pub branch: Option<String>,
}

/// Builds `<repository_url>/blob/<branch>/<path>`.
pub fn changelog_url(repository_url: &str, branch: &str, path: &str) -> String {
    format!(
        "{}/blob/{}/{}",
        repository_url.trim_end_matches('/'),
        branch,
        path.trim_start_matches('/')
    )
}

/// What happened to the optional short-form summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// The caller did not ask for one, or there was nothing to summarize.
    NotRequested,
    Generated(String),
    /// The call failed; `text` holds the fixed fallback sentence.
    Degraded { text: String, reason: String },
}

impl SummaryOutcome {
    /// The summary text to publish, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            SummaryOutcome::NotRequested => None,
            SummaryOutcome::Generated(text) | SummaryOutcome::Degraded { text, .. } => Some(text),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, SummaryOutcome::Degraded { .. })
    }
}

/// Synthesizer output.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangelogDraft {
    /// Opens with a `## YYYY-MM-DD` heading.
    pub markdown: String,
    pub summary: SummaryOutcome,
    pub generated_at: DateTime<Utc>,
    /// Soft validation findings. Non-empty issues do not block publishing.
    pub issues: Vec<ValidationIssue>,
}

impl ChangelogDraft {
    fn no_significant_changes(now: DateTime<Utc>) -> Self {
        ChangelogDraft {
            markdown: format!(
                "## {}\n\n{}",
                now.date_naive().format("%Y-%m-%d"),
                NO_SIGNIFICANT_CHANGES
            ),
            summary: SummaryOutcome::NotRequested,
            generated_at: now,
            issues: Vec::new(),
        }
    }
}

/// Turns normalized commits into a changelog draft via a [`TextBackend`].
#[derive(Debug)]
pub struct ChangelogSynthesizer<B> {
    backend: B,
    changelog_path: String,
}

impl<B: TextBackend> ChangelogSynthesizer<B> {
    /// `changelog_path` is only used to link the changelog from summaries.
    pub fn new(backend: B, changelog_path: impl Into<String>) -> Self {
        ChangelogSynthesizer {
            backend,
            changelog_path: changelog_path.into(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub async fn generate(
        &self,
        commits: &[NormalizedCommit],
        options: &SynthesisOptions,
    ) -> Result<ChangelogDraft, GenerationError> {
        self.generate_at(commits, options, Utc::now()).await
    }

    /// Generates a draft as of `now`.
    ///
    /// Fails only if the changelog call fails or yields nothing usable; a
    /// failed summary call degrades to [`FALLBACK_SUMMARY`].
    pub async fn generate_at(
        &self,
        commits: &[NormalizedCommit],
        options: &SynthesisOptions,
        now: DateTime<Utc>,
    ) -> Result<ChangelogDraft, GenerationError> {
        let today = now.date_naive();
        let significant = filter_trivial(commits);

        if significant.is_empty() {
            debug!(total = commits.len(), "No significant commits, skipping generation");
            return Ok(ChangelogDraft::no_significant_changes(now));
        }

        let changelog_request = GenerationRequest {
            system: CHANGELOG_PROMPT.to_string(),
            user: format!(
                "Date: {}\n\nCommits:\n{}",
                today.format("%Y-%m-%d"),
                serde_json::to_string_pretty(&significant)?
            ),
            max_tokens: CHANGELOG_MAX_TOKENS,
            temperature: CHANGELOG_TEMPERATURE,
        };

        let summary_request = if options.include_summary {
            Some(self.summary_request(commits, options)?)
        } else {
            None
        };

        let (changelog, summary) = tokio::join!(
            self.backend.generate(&changelog_request),
            self.summarize(summary_request.as_ref()),
        );

        let markdown = clean_markdown(&changelog?, today);
        if markdown.lines().skip(1).all(|line| line.trim().is_empty()) {
            return Err(GenerationError::EmptyResponse);
        }

        let issues = validate_changelog(&markdown);
        if !issues.is_empty() {
            let listed = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(issues = %listed, "Generated changelog failed validation, publishing anyway");
        }

        Ok(ChangelogDraft {
            markdown,
            summary,
            generated_at: now,
            issues,
        })
    }

    fn summary_request(
        &self,
        commits: &[NormalizedCommit],
        options: &SynthesisOptions,
    ) -> Result<GenerationRequest, GenerationError> {
        let summaries: Vec<&str> = commits.iter().map(|c| c.summary.as_str()).collect();
        let mut user = format!("Commits: {}", serde_json::to_string(&summaries)?);

        if let Some(repo_url) = &options.repository_url {
            let branch = options.branch.as_deref().unwrap_or("main");
            user.push_str("\n\nChangelog URL: ");
            user.push_str(&changelog_url(repo_url, branch, &self.changelog_path));
        }

        Ok(GenerationRequest {
            system: SUMMARY_PROMPT.to_string(),
            user,
            max_tokens: SUMMARY_MAX_TOKENS,
            temperature: SUMMARY_TEMPERATURE,
        })
    }

    async fn summarize(&self, request: Option<&GenerationRequest>) -> SummaryOutcome {
        let Some(request) = request else {
            return SummaryOutcome::NotRequested;
        };

        match self.backend.generate(request).await {
            Ok(text) if !text.trim().is_empty() => {
                SummaryOutcome::Generated(truncate_chars(text.trim(), SUMMARY_MAX_CHARS))
            }
            Ok(_) => {
                warn!("Summary call returned empty text, using fallback");
                SummaryOutcome::Degraded {
                    text: FALLBACK_SUMMARY.to_string(),
                    reason: GenerationError::EmptyResponse.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Summary call failed, using fallback");
                SummaryOutcome::Degraded {
                    text: FALLBACK_SUMMARY.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commits::normalize;
    use crate::test_utils::{Reply, ScriptedBackend, raw_commit};
    use chrono::TimeZone;

    const VALID: &str = "## 2024-03-15\n\n### ✨ Features\n- **ui**: dark mode (1111111)";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()
    }

    fn commits(messages: &[&str]) -> Vec<NormalizedCommit> {
        let raw: Vec<_> = messages
            .iter()
            .enumerate()
            .map(|(i, m)| raw_commit(i as u8 + 1, m))
            .collect();
        normalize(&raw)
    }

    fn synthesizer(backend: ScriptedBackend) -> ChangelogSynthesizer<ScriptedBackend> {
        ChangelogSynthesizer::new(backend, "CHANGELOG.md")
    }

    #[tokio::test]
    async fn trivial_only_input_makes_no_calls() {
        let synth = synthesizer(ScriptedBackend::new(VALID));
        let options = SynthesisOptions {
            include_summary: true,
            ..Default::default()
        };

        let draft = synth
            .generate_at(&commits(&["fix typo", "Merge branch 'x'"]), &options, now())
            .await
            .unwrap();

        assert_eq!(
            draft.markdown,
            "## 2024-03-15\n\nNo significant changes in this release."
        );
        assert_eq!(draft.summary, SummaryOutcome::NotRequested);
        assert!(synth.backend().requests().is_empty());
    }

    #[tokio::test]
    async fn changelog_request_carries_date_and_serialized_commits() {
        let synth = synthesizer(ScriptedBackend::new(VALID));
        let draft = synth
            .generate_at(
                &commits(&["feat(ui): dark mode", "fix typo"]),
                &SynthesisOptions::default(),
                now(),
            )
            .await
            .unwrap();

        assert_eq!(draft.markdown, VALID);
        assert!(draft.issues.is_empty());
        assert_eq!(draft.summary, SummaryOutcome::NotRequested);

        let requests = synth.backend().requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.system, CHANGELOG_PROMPT);
        assert_eq!(request.max_tokens, 2000);
        assert_eq!(request.temperature, 0.3);
        assert!(request.user.starts_with("Date: 2024-03-15\n\nCommits:\n"));
        assert!(request.user.contains("\"summary\": \"dark mode\""));
        assert!(request.user.contains("\"kind\": \"feature\""));
        assert!(!request.user.contains("typo"));
    }

    #[tokio::test]
    async fn raw_output_is_cleaned() {
        let backend =
            ScriptedBackend::new("Here is the changelog:\n```markdown\n### 🐛 Bug Fixes\n- y (2222222)\n```");
        let synth = synthesizer(backend);
        let draft = synth
            .generate_at(&commits(&["fix: y"]), &SynthesisOptions::default(), now())
            .await
            .unwrap();

        assert_eq!(draft.markdown, "## 2024-03-15\n\n### 🐛 Bug Fixes\n- y (2222222)");
    }

    #[tokio::test]
    async fn validation_issues_do_not_fail_generation() {
        let synth = synthesizer(ScriptedBackend::new("## 2024-03-15\n\nSome prose."));
        let draft = synth
            .generate_at(&commits(&["feat: x"]), &SynthesisOptions::default(), now())
            .await
            .unwrap();

        assert_eq!(
            draft.issues,
            vec![ValidationIssue::NoSections, ValidationIssue::NoCommitIds]
        );
    }

    #[tokio::test]
    async fn heading_only_output_is_unusable() {
        let synth = synthesizer(ScriptedBackend::new("```\n```"));
        let result = synth
            .generate_at(&commits(&["feat: x"]), &SynthesisOptions::default(), now())
            .await;
        assert!(matches!(result, Err(GenerationError::EmptyResponse)));
    }

    #[tokio::test]
    async fn changelog_failure_is_fatal() {
        let synth = synthesizer(ScriptedBackend::failing(503));
        let result = synth
            .generate_at(&commits(&["feat: x"]), &SynthesisOptions::default(), now())
            .await;
        assert!(matches!(result, Err(GenerationError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn summary_is_generated_and_truncated() {
        let long = "x".repeat(400);
        let synth = synthesizer(ScriptedBackend::new(VALID).with_summary(Reply::Text(long)));
        let options = SynthesisOptions {
            include_summary: true,
            repository_url: Some("https://github.com/octocat/hello-world".into()),
            branch: Some("trunk".into()),
        };

        let draft = synth
            .generate_at(&commits(&["feat(ui): dark mode"]), &options, now())
            .await
            .unwrap();

        let text = draft.summary.text().unwrap();
        assert_eq!(text.chars().count(), 240);
        assert!(text.ends_with("..."));
        assert!(!draft.summary.is_degraded());

        let requests = synth.backend().requests();
        let summary_request = requests
            .iter()
            .find(|r| r.system == SUMMARY_PROMPT)
            .unwrap();
        assert_eq!(summary_request.max_tokens, 300);
        assert_eq!(summary_request.temperature, 0.5);
        assert!(summary_request.user.contains("[\"dark mode\"]"));
        assert!(summary_request.user.contains(
            "https://github.com/octocat/hello-world/blob/trunk/CHANGELOG.md"
        ));
    }

    #[tokio::test]
    async fn summary_failure_degrades_to_fallback() {
        let synth = synthesizer(ScriptedBackend::new(VALID).with_summary(Reply::Status(500)));
        let options = SynthesisOptions {
            include_summary: true,
            ..Default::default()
        };

        let draft = synth
            .generate_at(&commits(&["feat: x"]), &options, now())
            .await
            .unwrap();

        assert!(draft.summary.is_degraded());
        assert_eq!(draft.summary.text(), Some(FALLBACK_SUMMARY));
        assert_eq!(draft.markdown, VALID);
    }

    #[test]
    fn changelog_url_joins_cleanly() {
        assert_eq!(
            changelog_url("https://github.com/o/r/", "main", "/CHANGELOG.md"),
            "https://github.com/o/r/blob/main/CHANGELOG.md"
        );
    }
}
