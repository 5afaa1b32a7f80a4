//! Shared test utilities: fixtures, arbitrary generators, and in-memory fakes
//! for the version-control provider and the generative backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::effects::{
    CommitData, FileContent, GitHubEffect, GitHubInterpreter, GitHubResponse, InterpreterFactory,
};
use crate::github::{GitHubApiError, GitHubErrorKind};
use crate::llm::synthesizer::SUMMARY_PROMPT;
use crate::llm::{GenerationError, GenerationRequest, TextBackend};
use crate::types::{RawCommit, RepoId, Sha};

// ─── Fixtures & Generators ────────────────────────────────────────────────────

/// A deterministic SHA whose short form is unique per `n`.
pub fn sha(n: u8) -> Sha {
    Sha::parse(format!("{:02x}{}", n, "0".repeat(38))).unwrap()
}

pub fn arb_sha() -> impl Strategy<Value = Sha> {
    "[0-9a-f]{40}".prop_map(|s| Sha::parse(s).unwrap())
}

/// A single-parent commit with id `sha(n)`.
pub fn raw_commit(n: u8, message: &str) -> RawCommit {
    RawCommit {
        id: sha(n),
        message: message.to_string(),
        author: "octocat".to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 3, 15, 9, 0, 0).unwrap(),
        parents: vec![sha(0)],
    }
}

fn arb_message() -> impl Strategy<Value = String> {
    prop_oneof![
        "(feat|fix|docs|chore|refactor|test|perf)(\\([a-z]{1,8}\\))?!?: [a-z ]{1,30}",
        "[A-Za-z ]{1,40}",
        Just("Revert \"feat: x\"".to_string()),
        Just("wip: half done".to_string()),
        Just("chore: release [skip ci]".to_string()),
        Just("fix typo".to_string()),
    ]
}

/// Commit sequences drawn from a small id pool, so duplicates and merges
/// are common.
pub fn arb_raw_commits() -> impl Strategy<Value = Vec<RawCommit>> {
    prop::collection::vec((1u8..12, arb_message(), 0usize..3), 0..20).prop_map(|entries| {
        entries
            .into_iter()
            .map(|(n, message, parent_count)| {
                let mut commit = raw_commit(n, &message);
                commit.parents = (0..parent_count).map(|p| sha(200 + p as u8)).collect();
                commit
            })
            .collect()
    })
}

// ─── Scripted Text Backend ────────────────────────────────────────────────────

/// What a [`ScriptedBackend`] answers with.
#[derive(Debug, Clone)]
pub enum Reply {
    Text(String),
    /// Fail with an API error carrying this status.
    Status(u16),
}

/// A [`TextBackend`] that answers changelog and summary calls from a script
/// and records every request.
#[derive(Debug)]
pub struct ScriptedBackend {
    changelog: Reply,
    summary: Reply,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub const DEFAULT_SUMMARY: &'static str = "Dark mode is here! 🌙";

    pub fn new(changelog: &str) -> Self {
        ScriptedBackend {
            changelog: Reply::Text(changelog.to_string()),
            summary: Reply::Text(Self::DEFAULT_SUMMARY.to_string()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `status`.
    pub fn failing(status: u16) -> Self {
        ScriptedBackend {
            changelog: Reply::Status(status),
            summary: Reply::Status(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_summary(mut self, reply: Reply) -> Self {
        self.summary = reply;
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TextBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self.requests.lock().unwrap().push(request.clone());

        let reply = if request.system == SUMMARY_PROMPT {
            &self.summary
        } else {
            &self.changelog
        };

        match reply {
            Reply::Text(text) => Ok(text.clone()),
            Reply::Status(status) => Err(GenerationError::Api {
                status: *status,
                body: "scripted failure".to_string(),
            }),
        }
    }
}

// ─── Fake GitHub ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct FakeCommit {
    tree: Sha,
    parents: Vec<Sha>,
    message: String,
}

/// An issue filed against the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeIssue {
    pub number: u64,
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

#[derive(Debug)]
struct FakeState {
    default_branch: String,
    branches: HashMap<String, Sha>,
    commits: HashMap<Sha, FakeCommit>,
    trees: HashMap<Sha, BTreeMap<String, Sha>>,
    blobs: HashMap<Sha, String>,
    recent_commits: Vec<RawCommit>,
    issues: Vec<FakeIssue>,
    comments: Vec<(Sha, String)>,
    effects: Vec<GitHubEffect>,
    failures: HashMap<&'static str, GitHubErrorKind>,
    pending_races: u32,
    next_id: u64,
}

impl FakeState {
    fn fresh_sha(&mut self) -> Sha {
        let sha = Sha::parse(format!("fa{:038x}", self.next_id)).unwrap();
        self.next_id += 1;
        sha
    }

    fn add_tree(&mut self, entries: BTreeMap<String, Sha>) -> Sha {
        let sha = self.fresh_sha();
        self.trees.insert(sha.clone(), entries);
        sha
    }

    fn add_blob(&mut self, content: String) -> Sha {
        let sha = self.fresh_sha();
        self.blobs.insert(sha.clone(), content);
        sha
    }

    fn add_commit(&mut self, tree: Sha, parents: Vec<Sha>, message: &str) -> Sha {
        let sha = self.fresh_sha();
        self.commits.insert(
            sha.clone(),
            FakeCommit {
                tree,
                parents,
                message: message.to_string(),
            },
        );
        sha
    }

    fn tree_of(&self, commit: &Sha) -> BTreeMap<String, Sha> {
        self.commits
            .get(commit)
            .and_then(|c| self.trees.get(&c.tree))
            .cloned()
            .unwrap_or_default()
    }

    fn read(&self, commit: &Sha, path: &str) -> Option<(String, Sha)> {
        let blob = self.tree_of(commit).get(path)?.clone();
        let content = self.blobs.get(&blob)?.clone();
        Some((content, blob))
    }

    /// Commits `path = content` on top of `branch`.
    fn write_on(&mut self, branch: &str, path: &str, content: String, message: &str) {
        let tip = self.branches[branch].clone();
        let mut entries = self.tree_of(&tip);
        let blob = self.add_blob(content);
        entries.insert(path.to_string(), blob);
        let tree = self.add_tree(entries);
        let commit = self.add_commit(tree, vec![tip], message);
        self.branches.insert(branch.to_string(), commit);
    }

    fn resolve(&self, at: &str) -> Option<Sha> {
        if let Some(tip) = self.branches.get(at) {
            return Some(tip.clone());
        }
        Sha::parse(at).ok().filter(|sha| self.commits.contains_key(sha))
    }

    fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> bool {
        let mut stack = vec![descendant.clone()];
        while let Some(sha) = stack.pop() {
            if &sha == ancestor {
                return true;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn apply(&mut self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        match effect {
            GitHubEffect::GetDefaultBranch => {
                Ok(GitHubResponse::DefaultBranch(self.default_branch.clone()))
            }
            GitHubEffect::GetRef { branch } => match self.branches.get(&branch) {
                Some(sha) => Ok(GitHubResponse::Ref { sha: sha.clone() }),
                None => Err(GitHubApiError::not_found(format!("no branch {}", branch))),
            },
            GitHubEffect::GetCommit { sha } => match self.commits.get(&sha) {
                Some(commit) => Ok(GitHubResponse::Commit(CommitData {
                    sha: sha.clone(),
                    tree: commit.tree.clone(),
                    parents: commit.parents.clone(),
                })),
                None => Err(GitHubApiError::not_found(format!("no commit {}", sha))),
            },
            GitHubEffect::GetFileContent { path, at } => {
                let commit = self
                    .resolve(&at)
                    .ok_or_else(|| GitHubApiError::not_found(format!("no ref {}", at)))?;
                Ok(match self.read(&commit, &path) {
                    Some((content, sha)) => GitHubResponse::FileContent(FileContent { content, sha }),
                    None => GitHubResponse::FileAbsent,
                })
            }
            GitHubEffect::ListRecentCommits { branch, limit } => {
                if !self.branches.contains_key(&branch) {
                    return Err(GitHubApiError::not_found(format!("no branch {}", branch)));
                }
                Ok(GitHubResponse::RecentCommits(
                    self.recent_commits
                        .iter()
                        .take(limit as usize)
                        .cloned()
                        .collect(),
                ))
            }
            GitHubEffect::CreateBlob { content } => Ok(GitHubResponse::BlobCreated {
                sha: self.add_blob(content),
            }),
            GitHubEffect::CreateTree {
                base_tree,
                path,
                blob,
            } => {
                let mut entries = self
                    .trees
                    .get(&base_tree)
                    .cloned()
                    .ok_or_else(|| GitHubApiError::not_found(format!("no tree {}", base_tree)))?;
                if !self.blobs.contains_key(&blob) {
                    return Err(GitHubApiError::permanent_without_source(format!(
                        "no blob {}",
                        blob
                    )));
                }
                entries.insert(path, blob);
                Ok(GitHubResponse::TreeCreated {
                    sha: self.add_tree(entries),
                })
            }
            GitHubEffect::CreateCommit {
                message,
                tree,
                parent,
            } => {
                if !self.trees.contains_key(&tree) || !self.commits.contains_key(&parent) {
                    return Err(GitHubApiError::permanent_without_source(
                        "commit references unknown objects",
                    ));
                }
                Ok(GitHubResponse::CommitCreated {
                    sha: self.add_commit(tree, vec![parent], &message),
                })
            }
            GitHubEffect::UpdateRef { branch, sha } => {
                if self.pending_races > 0 {
                    self.pending_races -= 1;
                    self.push_concurrent(&branch);
                }

                let tip = self
                    .branches
                    .get(&branch)
                    .cloned()
                    .ok_or_else(|| GitHubApiError::not_found(format!("no branch {}", branch)))?;
                if !self.is_ancestor(&tip, &sha) {
                    return Err(GitHubApiError::ref_conflict(&branch));
                }
                self.branches.insert(branch, sha);
                Ok(GitHubResponse::RefUpdated)
            }
            GitHubEffect::CreateIssue {
                title,
                body,
                labels,
            } => {
                let number = self.issues.len() as u64 + 1;
                self.issues.push(FakeIssue {
                    number,
                    title,
                    body,
                    labels,
                });
                Ok(GitHubResponse::IssueCreated { number })
            }
            GitHubEffect::CreateCommitComment { sha, body } => {
                self.comments.push((sha, body));
                Ok(GitHubResponse::CommitCommentCreated {
                    id: self.comments.len() as u64,
                })
            }
        }
    }

    /// Another writer lands a commit that edits the changelog.
    fn push_concurrent(&mut self, branch: &str) {
        let tip = self.branches[branch].clone();
        let content = match self.read(&tip, FakeGitHub::CHANGELOG) {
            Some((prior, _)) => format!("{}\n\n{}", FakeGitHub::CONCURRENT_MARKER, prior),
            None => FakeGitHub::CONCURRENT_MARKER.to_string(),
        };
        self.write_on(branch, FakeGitHub::CHANGELOG, content, "docs: concurrent edit");
    }
}

/// An in-memory git repository speaking [`GitHubEffect`].
///
/// Ref updates are checked for fast-forward like the real API, and races can
/// be staged with [`FakeGitHub::advance_before_ref_updates`].
#[derive(Debug)]
pub struct FakeGitHub {
    state: Mutex<FakeState>,
}

impl Default for FakeGitHub {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeGitHub {
    const CHANGELOG: &'static str = "CHANGELOG.md";

    /// Line a staged concurrent push writes into the changelog.
    pub const CONCURRENT_MARKER: &'static str = "<!-- concurrent edit -->";

    /// A repository with one empty root commit on `main`.
    pub fn new() -> Self {
        let mut state = FakeState {
            default_branch: "main".to_string(),
            branches: HashMap::new(),
            commits: HashMap::new(),
            trees: HashMap::new(),
            blobs: HashMap::new(),
            recent_commits: Vec::new(),
            issues: Vec::new(),
            comments: Vec::new(),
            effects: Vec::new(),
            failures: HashMap::new(),
            pending_races: 0,
            next_id: 1,
        };
        let tree = state.add_tree(BTreeMap::new());
        let root = state.add_commit(tree, vec![], "Initial commit");
        state.branches.insert("main".to_string(), root);

        FakeGitHub {
            state: Mutex::new(state),
        }
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Renames the default branch.
    pub fn with_default_branch(self, name: &str) -> Self {
        {
            let mut state = self.state();
            let old = state.default_branch.clone();
            let tip = state.branches.remove(&old).unwrap();
            state.branches.insert(name.to_string(), tip);
            state.default_branch = name.to_string();
        }
        self
    }

    /// Commits a file on the default branch.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        {
            let mut state = self.state();
            let branch = state.default_branch.clone();
            state.write_on(&branch, path, content.to_string(), "seed");
        }
        self
    }

    /// Sets what `ListRecentCommits` returns (newest first).
    pub fn with_recent_commits(self, commits: Vec<RawCommit>) -> Self {
        self.state().recent_commits = commits;
        self
    }

    /// The next `n` ref updates each find that another writer advanced the
    /// branch just before them.
    pub fn advance_before_ref_updates(&self, n: u32) {
        self.state().pending_races = n;
    }

    /// Every effect named `effect` fails with `kind` from now on.
    pub fn fail_on(&self, effect: &'static str, kind: GitHubErrorKind) {
        self.state().failures.insert(effect, kind);
    }

    pub fn effects(&self) -> Vec<GitHubEffect> {
        self.state().effects.clone()
    }

    pub fn writes(&self) -> Vec<GitHubEffect> {
        self.effects().into_iter().filter(|e| e.is_write()).collect()
    }

    /// Number of times an effect named `effect` was attempted.
    pub fn count(&self, effect: &str) -> usize {
        self.state()
            .effects
            .iter()
            .filter(|e| e.name() == effect)
            .count()
    }

    pub fn ref_updates(&self) -> usize {
        self.count("update_ref")
    }

    pub fn issues(&self) -> Vec<FakeIssue> {
        self.state().issues.clone()
    }

    pub fn comments(&self) -> Vec<(Sha, String)> {
        self.state().comments.clone()
    }

    pub fn tip(&self, branch: &str) -> Option<Sha> {
        self.state().branches.get(branch).cloned()
    }

    /// Content of `path` at the tip of `branch`.
    pub fn file(&self, branch: &str, path: &str) -> Option<String> {
        let state = self.state();
        let tip = state.branches.get(branch)?;
        state.read(tip, path).map(|(content, _)| content)
    }

    pub fn parents(&self, commit: &Sha) -> Vec<Sha> {
        self.state()
            .commits
            .get(commit)
            .map(|c| c.parents.clone())
            .unwrap_or_default()
    }

    pub fn message(&self, commit: &Sha) -> Option<String> {
        self.state().commits.get(commit).map(|c| c.message.clone())
    }
}

fn injected(kind: GitHubErrorKind, effect: &str) -> GitHubApiError {
    let message = format!("injected failure in {}", effect);
    match kind {
        GitHubErrorKind::Transient => GitHubApiError::transient_without_source(message),
        GitHubErrorKind::Permanent => GitHubApiError::permanent_without_source(message),
        GitHubErrorKind::NotFound => GitHubApiError::not_found(message),
        GitHubErrorKind::RefConflict => GitHubApiError::ref_conflict("injected"),
    }
}

impl GitHubInterpreter for FakeGitHub {
    async fn interpret(&self, effect: GitHubEffect) -> Result<GitHubResponse, GitHubApiError> {
        let mut state = self.state();
        state.effects.push(effect.clone());
        if let Some(kind) = state.failures.get(effect.name()) {
            return Err(injected(*kind, effect.name()));
        }
        state.apply(effect)
    }
}

impl InterpreterFactory for Arc<FakeGitHub> {
    type Interpreter = Arc<FakeGitHub>;

    fn for_repo(&self, _repo: &RepoId) -> Arc<FakeGitHub> {
        Arc::clone(self)
    }
}
