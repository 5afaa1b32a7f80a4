//! Monthly commit quota.
//!
//! Usage is counted per repository per calendar month (UTC). Counters expire at
//! the first instant of the next month, so stale months clear themselves.
//!
//! The gate ([`QuotaTracker::check_limit`]) runs before any chargeable work;
//! [`QuotaTracker::increment`] runs only after a successful publish.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::types::{PlanTier, RepoId};

pub mod store;

pub use store::{CounterStore, FileStore, InMemoryStore, StoreError};

/// Default monthly commit ceiling for the free plan.
pub const DEFAULT_FREE_LIMIT: u64 = 50;

/// Returns the `YYYY-MM` month bucket for `now`.
pub fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Returns the first instant of the month after `now`.
pub fn next_month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        // Midnight on the first of a month is always a valid UTC instant.
        .unwrap_or(now)
}

/// Counter key for a repository's usage in the month containing `now`.
pub fn usage_key(repo: &RepoId, now: DateTime<Utc>) -> String {
    format!("usage:{}:{}", repo, month_key(now))
}

/// Counter key that records whether the upgrade notice was posted this month.
pub fn notice_key(repo: &RepoId, now: DateTime<Utc>) -> String {
    format!("notice:{}:{}", repo, month_key(now))
}

/// Result of a quota gate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub allowed: bool,
    pub current: u64,
    /// `None` for unlimited plans.
    pub limit: Option<u64>,
    /// `None` for unlimited plans.
    pub remaining: Option<u64>,
    pub plan: PlanTier,
}

impl QuotaStatus {
    /// Evaluates the gate for a plan and current usage.
    pub fn evaluate(plan: PlanTier, current: u64, free_limit: u64) -> Self {
        if plan.is_unlimited() {
            return QuotaStatus {
                allowed: true,
                current,
                limit: None,
                remaining: None,
                plan,
            };
        }

        QuotaStatus {
            allowed: current < free_limit,
            current,
            limit: Some(free_limit),
            remaining: Some(free_limit.saturating_sub(current)),
            plan,
        }
    }
}

/// Usage statistics for the current month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageStats {
    pub current: u64,
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub plan: PlanTier,
    pub resets_at: DateTime<Utc>,
}

/// Quota gate and usage recorder over a [`CounterStore`].
#[derive(Debug)]
pub struct QuotaTracker<S> {
    store: S,
    free_limit: u64,
}

impl<S: CounterStore> QuotaTracker<S> {
    pub fn new(store: S, free_limit: u64) -> Self {
        QuotaTracker { store, free_limit }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn free_limit(&self) -> u64 {
        self.free_limit
    }

    /// Checks whether the repository may process more commits this month.
    pub async fn check_limit(&self, repo: &RepoId) -> Result<QuotaStatus, StoreError> {
        self.check_limit_at(repo, Utc::now()).await
    }

    pub async fn check_limit_at(
        &self,
        repo: &RepoId,
        now: DateTime<Utc>,
    ) -> Result<QuotaStatus, StoreError> {
        let plan = self.store.get_plan(repo).await?;
        let current = self
            .store
            .get(&usage_key(repo, now), now)
            .await?
            .unwrap_or(0);
        Ok(QuotaStatus::evaluate(plan, current, self.free_limit))
    }

    /// Records `amount` processed commits. Returns the new monthly total.
    pub async fn increment(&self, repo: &RepoId, amount: u64) -> Result<u64, StoreError> {
        self.increment_at(repo, amount, Utc::now()).await
    }

    pub async fn increment_at(
        &self,
        repo: &RepoId,
        amount: u64,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let key = usage_key(repo, now);
        if amount == 0 {
            return Ok(self.store.get(&key, now).await?.unwrap_or(0));
        }
        self.store
            .increment(&key, amount, next_month_start(now), now)
            .await
    }

    /// Claims the right to post this month's upgrade notice.
    ///
    /// Returns true for exactly one caller per repository per month, even
    /// under concurrent deliveries.
    pub async fn claim_upgrade_notice(&self, repo: &RepoId) -> Result<bool, StoreError> {
        self.claim_upgrade_notice_at(repo, Utc::now()).await
    }

    pub async fn claim_upgrade_notice_at(
        &self,
        repo: &RepoId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let claimed = self
            .store
            .increment(&notice_key(repo, now), 1, next_month_start(now), now)
            .await?;
        Ok(claimed == 1)
    }

    /// Usage statistics for the current month.
    pub async fn usage(&self, repo: &RepoId) -> Result<UsageStats, StoreError> {
        let now = Utc::now();
        let status = self.check_limit_at(repo, now).await?;
        Ok(UsageStats {
            current: status.current,
            limit: status.limit,
            remaining: status.remaining,
            plan: status.plan,
            resets_at: next_month_start(now),
        })
    }
}
