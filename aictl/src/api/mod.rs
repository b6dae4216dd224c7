//! HTTP surface: a thin axum router over the orchestration core.
//!
//! Client applications authenticate with an `X-Api-Key` header. The surface
//! is deliberately small - one processing endpoint plus discovery and
//! liveness routes; administrative CRUD lives elsewhere.

pub mod handlers;
pub mod models;

use crate::AppState;
use axum::{
    Router,
    routing::{get, post},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/ai/process", post(handlers::process_request))
        .route("/api/v1/ai/networks", get(handlers::list_networks))
        .with_state(state)
}
