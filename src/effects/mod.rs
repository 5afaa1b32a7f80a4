//! Effects-as-data for GitHub operations.
//!
//! This module defines effect types that describe operations without executing them.
//! This enables:
//! - Publisher and reporter logic that is tested against an in-memory fake
//! - Logging/tracing of intended operations
//! - Asserting that rejected deliveries performed no writes

pub mod github;
pub mod interpreter;

pub use github::{CommitData, FileContent, GitHubEffect, GitHubResponse};
pub use interpreter::{GitHubInterpreter, InterpreterFactory, unexpected_response};
