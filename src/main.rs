use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use outreach_queue::app_state::AppState;
use outreach_queue::config::ServiceConfig;
use outreach_queue::routes;
use outreach_queue::services::queue::JobQueue;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Initializing outreach queue service");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Arc::new(handle),
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus metrics recorder");
            return ExitCode::FAILURE;
        }
    };

    // Register application metrics
    metrics::describe_counter!("jobs_enqueued_total", "Total jobs enqueued");
    metrics::describe_counter!("jobs_leased_total", "Total jobs leased by workers");
    metrics::describe_counter!("jobs_completed_total", "Total jobs completed");
    metrics::describe_counter!("jobs_failed_total", "Total jobs failed permanently");
    metrics::describe_counter!("jobs_requeued_total", "Total failed attempts requeued for retry");
    metrics::describe_gauge!("queue_pending_jobs", "Current number of pending jobs");

    let state = AppState::new(JobQueue::new(), config.worker_secret.as_str());

    let app = routes::build_router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    let listener = match tokio::net::TcpListener::bind(&config.bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %config.bind_addr, "Failed to bind to address");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("Server listening on {}", config.bind_addr);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
