//! Octocrab client wrapper scoped to a specific repository.
//!
//! This module provides `OctocrabClient`, which wraps an `Octocrab` instance
//! and scopes all operations to a specific repository, and `OctocrabFactory`,
//! which hands out such clients per push.

use std::time::Duration;

use octocrab::Octocrab;

use crate::effects::InterpreterFactory;
use crate::types::RepoId;

/// A GitHub API client scoped to a specific repository.
///
/// All operations performed through this client target the same repository,
/// matching the design where `GitHubEffect` variants don't include repo info.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,
    repo: RepoId,
}

impl OctocrabClient {
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self { client, repo }
    }

    /// Returns a reference to the underlying octocrab client.
    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    /// Returns the repository this client is scoped to.
    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn owner(&self) -> &str {
        &self.repo.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.repo
    }

    /// Builds a `/repos/{owner}/{repo}/...` route.
    pub fn route(&self, suffix: &str) -> String {
        format!(
            "/repos/{}/{}/{}",
            self.owner(),
            self.repo_name(),
            suffix.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("repo", &self.repo)
            .finish_non_exhaustive()
    }
}

/// Shares one authenticated octocrab instance across repositories.
#[derive(Clone)]
pub struct OctocrabFactory {
    client: Octocrab,
}

impl OctocrabFactory {
    pub fn new(client: Octocrab) -> Self {
        Self { client }
    }

    /// Creates a factory from a token, bounding every request by `timeout`.
    pub fn from_token(token: impl Into<String>, timeout: Duration) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder()
            .personal_token(token.into())
            .set_connect_timeout(Some(timeout))
            .set_read_timeout(Some(timeout))
            .set_write_timeout(Some(timeout))
            .build()?;
        Ok(Self::new(client))
    }
}

impl InterpreterFactory for OctocrabFactory {
    type Interpreter = OctocrabClient;

    fn for_repo(&self, repo: &RepoId) -> OctocrabClient {
        OctocrabClient::new(self.client.clone(), repo.clone())
    }
}

impl std::fmt::Debug for OctocrabFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabFactory").finish_non_exhaustive()
    }
}
