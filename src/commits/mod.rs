//! Commit normalization.
//!
//! Turns raw commits into deduplicated, classified entries:
//!
//! 1. Merge commits (two or more parents) are dropped
//! 2. Reverts (message starts with "revert", any case) are dropped
//! 3. Commits carrying a skip marker or a WIP marker are dropped
//! 4. Duplicates by full SHA are dropped, first occurrence wins
//! 5. The rest are parsed as conventional commits
//!
//! Input order is preserved.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::debug;

use crate::types::{NormalizedCommit, RawCommit};

pub mod conventional;
pub mod trivial;

pub use conventional::{parse_commit, strip_decorations};
pub use trivial::{filter_trivial, is_trivial};

/// In-band tokens that mark a commit as not to be processed.
///
/// The publisher's own commits carry [`SKIP_MARKERS`]`[0]`.
pub const SKIP_MARKERS: &[&str] = &["[skip ci]", "[ci skip]", "[skip changelog]"];

static WIP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bwip\b").expect("invalid regex"));

/// Returns true if the message contains any skip marker (case-insensitive).
pub fn contains_skip_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    SKIP_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Why a raw commit was left out of the normalized output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    Merge,
    Revert,
    SkipMarker,
    WorkInProgress,
    Duplicate,
}

/// Returns the reason a commit should be excluded, ignoring duplication.
pub fn exclusion_reason(commit: &RawCommit) -> Option<Exclusion> {
    if commit.is_merge() {
        return Some(Exclusion::Merge);
    }

    let trimmed = commit.message.trim_start();
    let is_revert = trimmed
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("revert"));
    if is_revert {
        return Some(Exclusion::Revert);
    }

    if contains_skip_marker(&commit.message) {
        return Some(Exclusion::SkipMarker);
    }

    if WIP_RE.is_match(&commit.message) {
        return Some(Exclusion::WorkInProgress);
    }

    None
}

/// Normalizes a sequence of raw commits.
pub fn normalize(commits: &[RawCommit]) -> Vec<NormalizedCommit> {
    let mut seen = HashSet::new();
    let mut normalized = Vec::with_capacity(commits.len());

    for commit in commits {
        let reason = exclusion_reason(commit).or_else(|| {
            (!seen.insert(commit.id.clone())).then_some(Exclusion::Duplicate)
        });

        match reason {
            Some(reason) => {
                debug!(sha = %commit.id.short(), ?reason, "Excluding commit");
            }
            None => normalized.push(parse_commit(commit)),
        }
    }

    normalized
}
