//! Durable counter/state store used by the quota tracker.
//!
//! The pipeline needs four things from a store: read a counter, set a counter
//! with an expiry, atomically increment a counter, and look up a repository's
//! plan. [`CounterStore`] captures exactly that.
//!
//! Two implementations are provided:
//! - [`InMemoryStore`] for tests and throwaway deployments
//! - [`FileStore`], which persists a JSON snapshot after every mutation using
//!   write-to-temp, fsync, rename, fsync-dir
//!
//! Expiry is judged against the `now` the caller passes in, never the store's
//! own clock, so a run reads and writes one consistent month.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::future::Future;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::types::{PlanTier, RepoId};

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from the counter store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("schema version mismatch: expected {expected}, got {got}")]
    SchemaMismatch { expected: u32, got: u32 },

    #[error("counter overflow for key {0}")]
    Overflow(String),

    #[error("snapshot write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A durable key/counter store with per-key expiry.
///
/// Implementations must make `increment` atomic per key: concurrent
/// increments of the same key never lose updates.
pub trait CounterStore: Send + Sync {
    /// Reads a counter. Keys absent or expired as of `now` read as `None`.
    fn get(
        &self,
        key: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<u64>, StoreError>> + Send;

    /// Sets a counter to `value`, expiring at `expires_at`.
    fn set(
        &self,
        key: &str,
        value: u64,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Adds `amount` to a counter (absent or expired as of `now` counts as
    /// zero) and sets its expiry. Returns the new value.
    fn increment(
        &self,
        key: &str,
        amount: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Returns the repository's plan; unknown repositories are on the free plan.
    fn get_plan(&self, repo: &RepoId) -> impl Future<Output = Result<PlanTier, StoreError>> + Send;

    /// Records the repository's plan. Called by the billing collaborator.
    fn set_plan(
        &self,
        repo: &RepoId,
        plan: PlanTier,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ─── Shared state ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Counter {
    value: u64,
    expires_at: DateTime<Utc>,
}

/// The full store contents; also the on-disk format of [`FileStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct StoreSnapshot {
    schema_version: u32,
    counters: HashMap<String, Counter>,
    /// Keyed by `owner/repo`.
    plans: HashMap<String, PlanTier>,
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        StoreSnapshot {
            schema_version: SCHEMA_VERSION,
            counters: HashMap::new(),
            plans: HashMap::new(),
        }
    }
}

impl StoreSnapshot {
    fn get(&self, key: &str, now: DateTime<Utc>) -> Option<u64> {
        self.counters
            .get(key)
            .filter(|c| c.expires_at > now)
            .map(|c| c.value)
    }

    fn set(&mut self, key: &str, value: u64, expires_at: DateTime<Utc>) {
        self.counters
            .insert(key.to_string(), Counter { value, expires_at });
    }

    fn increment(
        &mut self,
        key: &str,
        amount: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let current = self.get(key, now).unwrap_or(0);
        let value = current
            .checked_add(amount)
            .ok_or_else(|| StoreError::Overflow(key.to_string()))?;
        self.set(key, value, expires_at);
        Ok(value)
    }

    fn plan(&self, repo: &RepoId) -> PlanTier {
        self.plans
            .get(&repo.to_string())
            .copied()
            .unwrap_or_default()
    }

    fn purge_expired(&mut self, now: DateTime<Utc>) {
        self.counters.retain(|_, c| c.expires_at > now);
    }
}

fn lock(state: &Mutex<StoreSnapshot>) -> MutexGuard<'_, StoreSnapshot> {
    // The snapshot is always left consistent between statements, so a
    // poisoned lock is still safe to use.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ─── In-memory store ──────────────────────────────────────────────────────────

/// A process-local store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
        Ok(lock(&self.state).get(key, now))
    }

    async fn set(&self, key: &str, value: u64, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        lock(&self.state).set(key, value, expires_at);
        Ok(())
    }

    async fn increment(
        &self,
        key: &str,
        amount: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        lock(&self.state).increment(key, amount, expires_at, now)
    }

    async fn get_plan(&self, repo: &RepoId) -> Result<PlanTier, StoreError> {
        Ok(lock(&self.state).plan(repo))
    }

    async fn set_plan(&self, repo: &RepoId, plan: PlanTier) -> Result<(), StoreError> {
        lock(&self.state).plans.insert(repo.to_string(), plan);
        Ok(())
    }
}

// ─── File-backed store ────────────────────────────────────────────────────────

/// A store persisted to a single JSON file.
///
/// Mutations are serialized by an async lock held across the write, so
/// increments never interleave within the process. The write itself runs on
/// the blocking pool. Only one process may own a given file.
#[derive(Debug)]
pub struct FileStore {
    path: Arc<PathBuf>,
    state: AsyncMutex<StoreSnapshot>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let snapshot = match std::fs::read(&path) {
            Ok(bytes) => {
                let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
                if snapshot.schema_version != SCHEMA_VERSION {
                    return Err(StoreError::SchemaMismatch {
                        expected: SCHEMA_VERSION,
                        got: snapshot.schema_version,
                    });
                }
                snapshot
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(e.into()),
        };

        Ok(FileStore {
            path: Arc::new(path),
            state: AsyncMutex::new(snapshot),
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies a mutation to a copy of the state, persists the copy, and only
    /// then installs it, so memory never runs ahead of disk.
    ///
    /// Counters expired as of `purge_before` are dropped from the written
    /// snapshot.
    async fn mutate<T>(
        &self,
        purge_before: Option<DateTime<Utc>>,
        f: impl FnOnce(&mut StoreSnapshot) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut state = self.state.lock().await;
        let mut next = state.clone();

        let result = f(&mut next)?;
        if let Some(now) = purge_before {
            next.purge_expired(now);
        }

        let path = Arc::clone(&self.path);
        let next = tokio::task::spawn_blocking(move || {
            save_atomic(&path, &next)?;
            Ok::<_, StoreError>(next)
        })
        .await??;

        *state = next;
        Ok(result)
    }
}

impl CounterStore for FileStore {
    async fn get(&self, key: &str, now: DateTime<Utc>) -> Result<Option<u64>, StoreError> {
        Ok(self.state.lock().await.get(key, now))
    }

    async fn set(&self, key: &str, value: u64, expires_at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mutate(None, |s| {
            s.set(key, value, expires_at);
            Ok(())
        })
        .await
    }

    async fn increment(
        &self,
        key: &str,
        amount: u64,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.mutate(Some(now), |s| s.increment(key, amount, expires_at, now))
            .await
    }

    async fn get_plan(&self, repo: &RepoId) -> Result<PlanTier, StoreError> {
        Ok(self.state.lock().await.plan(repo))
    }

    async fn set_plan(&self, repo: &RepoId, plan: PlanTier) -> Result<(), StoreError> {
        self.mutate(None, |s| {
            s.plans.insert(repo.to_string(), plan);
            Ok(())
        })
        .await
    }
}

/// Writes the snapshot atomically:
/// 1. Write to `<path>.tmp`
/// 2. fsync the temp file
/// 3. Rename to `<path>`
/// 4. fsync the parent directory
fn save_atomic(path: &Path, snapshot: &StoreSnapshot) -> Result<(), StoreError> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(snapshot)?;

    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    std::fs::rename(&tmp_path, path)?;

    // The rename is only durable once the directory entry is synced.
    if let Some(parent) = parent {
        File::open(parent)?.sync_all()?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
    }

    fn later() -> DateTime<Utc> {
        now() + Duration::days(1)
    }

    fn earlier() -> DateTime<Utc> {
        now() - Duration::seconds(1)
    }

    #[tokio::test]
    async fn in_memory_increment_accumulates() {
        let store = InMemoryStore::new();
        assert_eq!(store.get("k", now()).await.unwrap(), None);
        assert_eq!(store.increment("k", 3, later(), now()).await.unwrap(), 3);
        assert_eq!(store.increment("k", 4, later(), now()).await.unwrap(), 7);
        assert_eq!(store.get("k", now()).await.unwrap(), Some(7));
    }

    #[tokio::test]
    async fn expired_counters_read_as_absent_and_restart() {
        let store = InMemoryStore::new();
        store.set("k", 10, earlier()).await.unwrap();
        assert_eq!(store.get("k", now()).await.unwrap(), None);
        assert_eq!(store.increment("k", 1, later(), now()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expiry_is_judged_against_the_callers_clock() {
        // Counters written for a past month stay live when read as of that
        // month, whatever the wall clock says.
        let store = InMemoryStore::new();
        assert_eq!(store.increment("k", 50, later(), now()).await.unwrap(), 50);
        assert_eq!(store.get("k", now()).await.unwrap(), Some(50));
        assert_eq!(store.increment("k", 1, later(), now()).await.unwrap(), 51);
        assert_eq!(store.get("k", later()).await.unwrap(), None);

        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).unwrap();
        assert_eq!(store.increment("k", 50, later(), now()).await.unwrap(), 50);
        assert_eq!(store.get("k", now()).await.unwrap(), Some(50));
        assert_eq!(store.increment("k", 1, later(), now()).await.unwrap(), 51);
        assert_eq!(store.get("k", later()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn overflow_is_an_error() {
        let store = InMemoryStore::new();
        store.set("k", u64::MAX, later()).await.unwrap();
        assert!(matches!(
            store.increment("k", 1, later(), now()).await,
            Err(StoreError::Overflow(_))
        ));
        assert_eq!(store.get("k", now()).await.unwrap(), Some(u64::MAX));
    }

    #[tokio::test]
    async fn unknown_plan_is_free() {
        let store = InMemoryStore::new();
        let repo = RepoId::new("octocat", "hello-world");
        assert_eq!(store.get_plan(&repo).await.unwrap(), PlanTier::Free);
        store.set_plan(&repo, PlanTier::Pro).await.unwrap();
        assert_eq!(store.get_plan(&repo).await.unwrap(), PlanTier::Pro);
    }

    #[tokio::test]
    async fn file_store_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");
        let repo = RepoId::new("octocat", "hello-world");

        {
            let store = FileStore::open(&path).unwrap();
            store.increment("usage", 5, later(), now()).await.unwrap();
            store.set_plan(&repo, PlanTier::Pro).await.unwrap();
        }

        let reopened = FileStore::open(&path).unwrap();
        assert_eq!(reopened.get("usage", now()).await.unwrap(), Some(5));
        assert_eq!(reopened.get_plan(&repo).await.unwrap(), PlanTier::Pro);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn file_store_purges_expired_on_increment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = FileStore::open(&path).unwrap();
        store.set("stale", 1, earlier()).await.unwrap();
        store.increment("fresh", 2, later(), now()).await.unwrap();

        let on_disk: StoreSnapshot = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert!(!on_disk.counters.contains_key("stale"));
        assert_eq!(on_disk.counters["fresh"].value, 2);
    }

    #[tokio::test]
    async fn failed_write_leaves_state_untouched() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let store = FileStore::open(blocker.join("store.json")).unwrap();
        assert!(store.increment("k", 1, later(), now()).await.is_err());
        assert_eq!(store.get("k", now()).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_file_increments_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FileStore::open(dir.path().join("store.json")).unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.increment("k", 1, later(), now()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(store.get("k", now()).await.unwrap(), Some(16));
        let reopened = FileStore::open(store.path()).unwrap();
        assert_eq!(reopened.get("k", now()).await.unwrap(), Some(16));
    }

    #[test]
    fn file_store_rejects_unknown_schema() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(
            &path,
            r#"{"schema_version": 99, "counters": {}, "plans": {}}"#,
        )
        .unwrap();

        assert!(matches!(
            FileStore::open(&path),
            Err(StoreError::SchemaMismatch {
                expected: SCHEMA_VERSION,
                got: 99
            })
        ));
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(store.path(), dir.path().join("absent.json"));
    }
}
