//! Effect interpreter trait.
//!
//! The trait-based design lets the publisher, reporter and orchestrator run
//! against the real API in production and an in-memory fake in tests.

use std::future::Future;
use std::sync::Arc;

use super::github::{GitHubEffect, GitHubResponse};
use crate::github::GitHubApiError;
use crate::types::RepoId;

/// Interprets GitHub effects against the GitHub API.
///
/// Implementations are constructed with a `RepoId`, so all effects executed
/// through a single interpreter instance are scoped to that repository.
pub trait GitHubInterpreter: Send + Sync {
    /// Execute a GitHub effect and return its response.
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, GitHubApiError>> + Send;
}

impl<G: GitHubInterpreter> GitHubInterpreter for Arc<G> {
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, GitHubApiError>> + Send {
        (**self).interpret(effect)
    }
}

/// Builds repo-scoped interpreters.
///
/// The orchestrator learns the repository from each push, so it holds a
/// factory rather than a single interpreter.
pub trait InterpreterFactory: Send + Sync {
    type Interpreter: GitHubInterpreter;

    fn for_repo(&self, repo: &RepoId) -> Self::Interpreter;
}

/// Returns an unexpected-response error for `effect`.
pub fn unexpected_response(effect: &str, response: &GitHubResponse) -> GitHubApiError {
    GitHubApiError::permanent_without_source(format!(
        "unexpected response to {}: {}",
        effect,
        response.variant_name()
    ))
}
