//! API Module
//!
//! HTTP API layer for the orchestrator.

pub mod analysis;
pub mod error;
pub mod health;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::AnalysisService;

/// Create the main API router with all endpoints
pub fn create_router(service: Arc<AnalysisService>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/analyses", post(analysis::create_analysis))
        .route("/analyses", get(analysis::list_analyses))
        .route("/analyses/{id}", get(analysis::get_analysis))
        .route(
            "/analyses/sample/{sample_id}",
            get(analysis::list_analyses_by_sample),
        )
        .route(
            "/analyses/status/{status}",
            get(analysis::list_analyses_by_status),
        )
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
