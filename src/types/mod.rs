//! Core domain types for the changelog bot.
//!
//! Everything here is constructed and discarded within a single pipeline run,
//! except [`PlanTier`], which the quota store persists per repository.

pub mod commit;
pub mod ids;
pub mod plan;

pub use commit::{CommitKind, NormalizedCommit, RawCommit};
pub use ids::{DeliveryId, InvalidSha, RepoId, Sha};
pub use plan::PlanTier;
