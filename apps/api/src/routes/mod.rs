pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::generation::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Generation API
        .route(
            "/api/v1/documents/generate",
            post(handlers::handle_generate),
        )
        .route("/api/v1/documents/batch", post(handlers::handle_batch))
        .route("/api/v1/templates", get(handlers::handle_list_templates))
        // Jobs API
        .route("/api/v1/jobs", get(handlers::handle_list_jobs))
        .route("/api/v1/jobs/:id", get(handlers::handle_get_job))
        .route("/api/v1/jobs/:id/output", get(handlers::handle_get_output))
        .with_state(state)
}
