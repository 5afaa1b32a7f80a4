//! Conventional-commit parsing: `type(scope)!: subject`.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{CommitKind, NormalizedCommit, RawCommit};

static CONVENTIONAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<type>\w+)(?:\((?P<scope>[^)]+)\))?(?P<breaking>!)?:\s*(?P<subject>.+)$")
        .expect("invalid regex")
});

static BREAKING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BREAKING[ -]CHANGE").expect("invalid regex"));

/// `:sparkles:`-style shortcodes. Must start with a letter so times like
/// `10:30:45` survive.
static SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[a-zA-Z][a-zA-Z0-9_+-]*:").expect("invalid regex"));

/// Pictographs, symbols, dingbats, flags, plus the variation selector and
/// zero-width joiner that glue emoji sequences together.
static EMOJI_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"[\x{1F300}-\x{1F5FF}\x{1F600}-\x{1F64F}\x{1F680}-\x{1F6FF}",
        r"\x{1F900}-\x{1F9FF}\x{1F1E0}-\x{1F1FF}\x{2600}-\x{26FF}",
        r"\x{2700}-\x{27BF}\x{FE0F}\x{200D}]"
    ))
    .expect("invalid regex")
});

/// Removes emoji and emoji shortcodes from a message.
pub fn strip_decorations(message: &str) -> String {
    let without_codes = SHORTCODE_RE.replace_all(message, "");
    EMOJI_RE.replace_all(&without_codes, "").into_owned()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses a raw commit into a normalized entry.
///
/// Commits without a conventional prefix are kept as [`CommitKind::Other`]
/// with the whole first line as summary.
pub fn parse_commit(raw: &RawCommit) -> NormalizedCommit {
    let cleaned = strip_decorations(&raw.message);
    let mut lines = cleaned.lines();
    let first_line = collapse_whitespace(lines.next().unwrap_or(""));
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();

    let mentions_breaking = BREAKING_RE.is_match(&cleaned);

    let (kind, scope, summary, bang) = match CONVENTIONAL_RE.captures(&first_line) {
        Some(caps) => (
            CommitKind::from_type_token(&caps["type"]),
            caps.name("scope").map(|m| m.as_str().trim().to_string()),
            caps["subject"].trim().to_string(),
            caps.name("breaking").is_some(),
        ),
        None => (CommitKind::Other, None, first_line.clone(), false),
    };

    NormalizedCommit {
        kind,
        scope,
        summary,
        breaking: bang || mentions_breaking,
        short_id: raw.id.short().to_string(),
        author: raw.author.clone(),
        timestamp: raw.timestamp,
        body: (!body.is_empty()).then_some(body),
    }
}
