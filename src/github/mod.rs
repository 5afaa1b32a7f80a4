//! GitHub API client and effect interpreter.
//!
//! This module provides the implementation for executing GitHub effects via the octocrab
//! library. It implements the `GitHubInterpreter` trait defined in the effects module.
//!
//! Key features:
//! - Git data primitives (blob, tree, commit, ref) for conflict-safe writes
//! - Distinguishes transient, permanent, not-found and ref-conflict errors
//! - Bounded backoff helper for the publisher's conflict retry

mod client;
mod error;
mod interpreter;
mod retry;

pub use client::{OctocrabClient, OctocrabFactory};
pub use error::{GitHubApiError, GitHubErrorKind, categorize, is_ref_conflict_message};
pub use retry::{RetryConfig, RetryResult, retry_with_backoff};
