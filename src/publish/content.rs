//! Changelog file composition.

/// Default location of the changelog in the repository.
pub const DEFAULT_CHANGELOG_PATH: &str = "CHANGELOG.md";

/// Message of every commit the publisher creates.
///
/// Carries a skip marker so the push it causes is not processed again.
pub const PUBLISH_COMMIT_MESSAGE: &str = "chore: update changelog [skip ci]";

/// Header written when the changelog file does not exist yet.
pub const CHANGELOG_PREAMBLE: &str =
    "# Changelog\n\nAll notable changes to this project will be documented in this file.\n\n";

/// Separator between the new section and prior content.
pub const SECTION_SEPARATOR: &str = "\n\n";

/// Builds the full new file content: the new section first, prior content
/// after it. A missing file gets the standard preamble instead.
pub fn compose_changelog(section: &str, prior: Option<&str>) -> String {
    let section = section.trim_end();
    match prior {
        Some(prior) => {
            let mut content =
                String::with_capacity(section.len() + SECTION_SEPARATOR.len() + prior.len());
            content.push_str(section);
            content.push_str(SECTION_SEPARATOR);
            content.push_str(prior);
            content
        }
        None => format!("{}{}\n", CHANGELOG_PREAMBLE, section),
    }
}
