//! HTTP server for the orchestrator.
//!
//! Provides endpoints for:
//! - Task composition (`POST /compose`)
//! - Run creation (`POST /runs`)
//! - Run polling (`GET /runs?runId=...&waitSec=...`)
//! - Health check (`/health`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS layer for browser clients
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/compose", post(handlers::compose))
        .route("/runs", post(handlers::create_run).get(handlers::poll_run))
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
