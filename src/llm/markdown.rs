//! Post-processing and soft validation of generated changelog markdown.

use chrono::NaiveDate;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Section headings a changelog entry is expected to use.
pub const SECTION_TITLES: &[(&str, &str)] = &[
    ("⚠️", "Breaking Changes"),
    ("✨", "Features"),
    ("🐛", "Bug Fixes"),
    ("📝", "Documentation"),
    ("🔧", "Maintenance"),
];

static DATE_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## \d{4}-\d{2}-\d{2}").expect("invalid regex"));

static LEADING_DATE_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A## \d{4}-\d{2}-\d{2}").expect("invalid regex"));

static SHORT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\([a-f0-9]{7}\)").expect("invalid regex"));

static PREAMBLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(here is|here's|below is|i've generated|sure[,!])").expect("invalid regex")
});

static OPENING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A```[a-zA-Z]*[ \t]*\n?").expect("invalid regex"));

static CLOSING_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?```[ \t]*\z").expect("invalid regex"));

/// Cleans raw model output into a changelog section.
///
/// Normalizes line endings, drops a conversational first line and any code
/// fence wrapping, and prepends a `## YYYY-MM-DD` heading for `today` unless
/// the text already opens with one.
pub fn clean_markdown(raw: &str, today: NaiveDate) -> String {
    let normalized = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut text = normalized.trim();

    if text.lines().next().is_some_and(|line| PREAMBLE_RE.is_match(line)) {
        text = text.split_once('\n').map_or("", |(_, rest)| rest).trim();
    }

    let unfenced = OPENING_FENCE_RE.replace(text, "");
    let unfenced = CLOSING_FENCE_RE.replace(&unfenced, "");
    let body = unfenced.trim();

    if LEADING_DATE_HEADING_RE.is_match(body) {
        body.to_string()
    } else if body.is_empty() {
        format!("## {}", today.format("%Y-%m-%d"))
    } else {
        format!("## {}\n\n{}", today.format("%Y-%m-%d"), body)
    }
}

/// A soft quality problem found in a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationIssue {
    MissingDateHeading,
    NoSections,
    NoCommitIds,
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationIssue::MissingDateHeading => "missing date heading",
            ValidationIssue::NoSections => "no recognized changelog sections",
            ValidationIssue::NoCommitIds => "no commit identifiers",
        };
        f.write_str(text)
    }
}

fn has_section_marker(markdown: &str) -> bool {
    markdown.lines().any(|line| {
        let Some(heading) = line.strip_prefix("### ") else {
            return false;
        };
        let heading = heading.trim();
        SECTION_TITLES.iter().any(|(emoji, title)| {
            heading.starts_with(emoji)
                || heading.eq_ignore_ascii_case(title)
                || heading
                    .strip_prefix(emoji)
                    .is_some_and(|rest| rest.trim().eq_ignore_ascii_case(title))
        })
    })
}

/// Checks a draft's shape. An empty result means no issues were found.
pub fn validate_changelog(markdown: &str) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    if !DATE_HEADING_RE.is_match(markdown) {
        issues.push(ValidationIssue::MissingDateHeading);
    }
    if !has_section_marker(markdown) {
        issues.push(ValidationIssue::NoSections);
    }
    if !SHORT_ID_RE.is_match(markdown) {
        issues.push(ValidationIssue::NoCommitIds);
    }
    issues
}

/// Hard-truncates `text` to at most `max_chars` characters, ending in `...`
/// when truncated.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    }

    #[test]
    fn preamble_and_fence_are_stripped() {
        let raw = "Here is your changelog:\n```markdown\n## 2024-03-15\n\n### ✨ Features\n- x (abc1234)\n```";
        assert_eq!(
            clean_markdown(raw, today()),
            "## 2024-03-15\n\n### ✨ Features\n- x (abc1234)"
        );
    }

    #[test]
    fn missing_heading_is_prepended() {
        let raw = "### 🐛 Bug Fixes\r\n- fix (abc1234)";
        assert_eq!(
            clean_markdown(raw, today()),
            "## 2024-03-15\n\n### 🐛 Bug Fixes\n- fix (abc1234)"
        );
    }

    #[test]
    fn non_date_h2_still_gets_date_heading() {
        let cleaned = clean_markdown("## Release notes\n- x", today());
        assert!(cleaned.starts_with("## 2024-03-15\n\n## Release notes"));
    }

    #[test]
    fn existing_heading_is_kept() {
        let raw = "## 2023-12-01\n\n### Features\n- y";
        assert_eq!(clean_markdown(raw, today()), raw);
    }

    #[test]
    fn valid_draft_has_no_issues() {
        let md = "## 2024-03-15\n\n### ✨ Features\n- dark mode (abc1234)";
        assert!(validate_changelog(md).is_empty());
    }

    #[test]
    fn plain_section_titles_are_recognized() {
        let md = "## 2024-03-15\n\n### Bug Fixes\n- y (abc1234)";
        assert!(validate_changelog(md).is_empty());
    }

    #[test]
    fn every_issue_is_reported() {
        let issues = validate_changelog("just some text");
        assert_eq!(
            issues,
            vec![
                ValidationIssue::MissingDateHeading,
                ValidationIssue::NoSections,
                ValidationIssue::NoCommitIds,
            ]
        );
    }

    #[test]
    fn unknown_section_is_not_a_marker() {
        let md = "## 2024-03-15\n\n### Misc\n- y (abc1234)";
        assert_eq!(validate_changelog(md), vec![ValidationIssue::NoSections]);
    }

    #[test]
    fn truncation_adds_ellipsis() {
        let long = "a".repeat(300);
        let out = truncate_chars(&long, 240);
        assert_eq!(out.chars().count(), 240);
        assert!(out.ends_with("..."));
        assert_eq!(truncate_chars("short", 240), "short");
    }

    proptest! {
        #[test]
        fn prop_cleaned_always_opens_with_date_heading(raw in ".{0,200}") {
            let cleaned = clean_markdown(&raw, today());
            prop_assert!(LEADING_DATE_HEADING_RE.is_match(&cleaned));
            prop_assert!(!cleaned.contains('\r'));
        }

        #[test]
        fn prop_truncation_respects_limit(text in "\\PC{0,400}") {
            prop_assert!(truncate_chars(&text, 240).chars().count() <= 240);
        }
    }
}
