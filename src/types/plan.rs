//! Per-repository plan tier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The billing plan a repository is on.
///
/// Written by the billing collaborator, read by the quota gate. Repositories
/// with no recorded plan are on [`PlanTier::Free`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
}

impl PlanTier {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, PlanTier::Pro)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
