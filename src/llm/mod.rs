//! Changelog synthesis via a generative text backend.

pub mod backend;
pub mod markdown;
pub mod synthesizer;

pub use backend::{
    AnthropicBackend, DEFAULT_ANTHROPIC_URL, GenerationError, GenerationRequest, TextBackend,
};
pub use markdown::{ValidationIssue, clean_markdown, validate_changelog};
pub use synthesizer::{
    ChangelogDraft, ChangelogSynthesizer, SummaryOutcome, SynthesisOptions, changelog_url,
};
