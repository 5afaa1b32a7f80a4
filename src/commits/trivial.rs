//! Trivial-commit filtering for synthesizer input.
//!
//! Quota accounting counts every accepted commit; only the prompt is spared
//! typo fixes and merge boilerplate.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::NormalizedCommit;

static TRIVIAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^(fix|update)?\s*(typos?|format(ting)?|lint(ing)?|style|whitespace)\b",
        r"^\s*$",
        r"(?i)^(merge|update)\s+(branch|from)\b",
        r"(?i)^merge\s+(pull request|remote-tracking branch)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid regex"))
    .collect()
});

/// Returns true if the commit is typo/formatting/lint noise or merge boilerplate.
pub fn is_trivial(commit: &NormalizedCommit) -> bool {
    TRIVIAL_PATTERNS.iter().any(|re| re.is_match(&commit.summary))
}

/// Returns the commits worth describing in a changelog, order preserved.
pub fn filter_trivial(commits: &[NormalizedCommit]) -> Vec<NormalizedCommit> {
    commits.iter().filter(|c| !is_trivial(c)).cloned().collect()
}
