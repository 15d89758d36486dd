use axum::routing::{get, post};
use axum::{middleware, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod auth;
pub mod errors;
pub mod health;
pub mod jobs;
pub mod metrics;

/// Request bodies larger than this are rejected.
const BODY_LIMIT_BYTES: usize = 1024 * 1024;

/// Queue API router. Lease, complete and fail require the worker secret;
/// enqueue and status queries are open.
pub fn build_router(state: AppState) -> Router {
    let worker_routes = Router::new()
        .route("/jobs/next", post(jobs::lease_job))
        .route("/jobs/{id}/complete", post(jobs::complete_job))
        .route("/jobs/{id}/fail", post(jobs::fail_job))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_worker_secret,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/jobs", post(jobs::enqueue_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .merge(worker_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT_BYTES))
}
