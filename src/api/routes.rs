//! Router construction

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::api::handlers;
use crate::AppState;

/// Upper bound for a whole HTTP exchange, failover included
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

pub async fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/generations", post(handlers::create_generation))
        .route("/v1/jobs/:id", get(handlers::get_job_progress))
        .route("/v1/jobs/:id/results", get(handlers::get_job_results))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
