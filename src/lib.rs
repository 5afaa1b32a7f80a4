//! Changelog Bot - turns pushes to a repository's primary branch into
//! changelog entries and commits them back.
//!
//! This library provides the pipeline and its collaborators; the binary wires
//! them to real GitHub, Anthropic and file-backed quota implementations.

pub mod commits;
pub mod config;
pub mod effects;
pub mod github;
pub mod llm;
pub mod pipeline;
pub mod publish;
pub mod quota;
pub mod report;
pub mod server;
pub mod types;
pub mod webhooks;

#[cfg(test)]
pub mod test_utils;
