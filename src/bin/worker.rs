use metrics_exporter_prometheus::PrometheusBuilder;
use outreach_queue::{
    config::WorkerConfig,
    services::{
        actuator::PageProbeActuator,
        browser::HttpBrowser,
        handlers::{HandlerRegistry, RetryPolicy, SendConnectionHandler, SEND_CONNECTION},
        navigator::{Navigator, NavigatorConfig},
        queue_client::QueueClient,
    },
    worker::{self, Poller},
};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting outreach worker");

    // Missing credentials are fatal
    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    match config.metrics_listen_addr() {
        Some(addr) => {
            if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
                tracing::error!(error = %e, %addr, "Failed to start metrics exporter");
                return ExitCode::FAILURE;
            }
            worker::describe_metrics();
            tracing::info!(%addr, "Serving worker metrics");
        }
        None => tracing::info!("Worker metrics exporter disabled"),
    }

    let client = match QueueClient::new(
        &config.queue_url,
        &config.worker_secret,
        config.request_timeout(),
    ) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize queue client");
            return ExitCode::FAILURE;
        }
    };

    let navigator = Arc::new(Navigator::new(
        Arc::new(HttpBrowser::new()),
        NavigatorConfig::from(&config),
    ));
    let handlers = HandlerRegistry::new().register(
        SEND_CONNECTION,
        Arc::new(SendConnectionHandler::new(
            navigator,
            Arc::new(PageProbeActuator),
            config.soft_mode,
        )),
    );
    tracing::info!(handlers = ?handlers.job_types(), "Handlers registered");

    let policy = RetryPolicy::from(&config);
    let poller = Poller::new(client, handlers, policy, config);

    // Stop taking new jobs on ctrl-c; the in-flight job finishes first.
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                tracing::warn!(%error, "Failed to listen for ctrl-c");
            }
            tracing::info!("Shutdown requested, finishing current job");
            cancel.cancel();
        });
    }

    poller.run(cancel).await;
    ExitCode::SUCCESS
}
