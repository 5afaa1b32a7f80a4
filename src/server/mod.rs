//! HTTP server for the changelog bot.
//!
//! # Endpoints
//!
//! - `POST /webhook` - Runs the changelog pipeline for a GitHub delivery
//! - `GET /api/v1/repos/{owner}/{repo}/usage` - Returns this month's usage as JSON
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

use crate::effects::InterpreterFactory;
use crate::llm::TextBackend;
use crate::pipeline::Pipeline;
use crate::quota::CounterStore;

pub mod health;
pub mod usage;
pub mod webhook;

pub use health::health_handler;
pub use usage::{InvalidPathComponent, usage_handler, validate_path_component};
pub use webhook::webhook_handler;

/// Shared application state.
///
/// This is passed to all handlers via Axum's `State` extractor. It holds the
/// pipeline, which owns every collaborator a delivery needs.
pub struct AppState<F, B, S> {
    pipeline: Arc<Pipeline<F, B, S>>,
}

impl<F, B, S> Clone for AppState<F, B, S> {
    fn clone(&self) -> Self {
        AppState {
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<F, B, S> AppState<F, B, S> {
    pub fn new(pipeline: Pipeline<F, B, S>) -> Self {
        AppState {
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn pipeline(&self) -> &Pipeline<F, B, S> {
        &self.pipeline
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<F, B, S>(app_state: AppState<F, B, S>) -> axum::Router
where
    F: InterpreterFactory + 'static,
    B: TextBackend + 'static,
    S: CounterStore + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/webhook", post(webhook_handler::<F, B, S>))
        .route("/api/v1/repos/{owner}/{repo}/usage", get(usage_handler::<F, B, S>))
        .route("/health", get(health_handler))
        .with_state(app_state)
}
