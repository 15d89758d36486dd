//! Polling worker: lease a job, run its handler, report the outcome.

use std::time::Instant;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::config::WorkerConfig;
use crate::models::job::{Job, JobId};
use crate::services::handlers::{HandlerRegistry, JobFailure, RetryPolicy};
use crate::services::queue_client::{ClientError, QueueClient};

/// Register descriptions for the metrics the worker process records.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "worker_jobs_processed_total",
        "Jobs processed by this worker, labelled by outcome"
    );
    metrics::describe_counter!(
        "navigation_attempts_total",
        "Page loads attempted against the target"
    );
    metrics::describe_histogram!(
        "navigation_seconds",
        metrics::Unit::Seconds,
        "Duration of a navigation run including the action"
    );
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// No job was available.
    Idle,
    /// A job ran and its outcome was reported.
    Completed(JobId),
    Failed(JobId),
}

pub struct Poller {
    client: QueueClient,
    handlers: HandlerRegistry,
    policy: RetryPolicy,
    config: WorkerConfig,
}

impl Poller {
    pub fn new(
        client: QueueClient,
        handlers: HandlerRegistry,
        policy: RetryPolicy,
        config: WorkerConfig,
    ) -> Self {
        Self {
            client,
            handlers,
            policy,
            config,
        }
    }

    /// Tick until `cancel` fires. A tick in progress always finishes.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            queue_url = %self.config.queue_url,
            job_types = ?self.config.job_types,
            soft_mode = self.config.soft_mode,
            "Worker ready, starting job processing loop"
        );

        while !cancel.is_cancelled() {
            match self.tick().await {
                Ok(TickOutcome::Completed(_) | TickOutcome::Failed(_)) => {
                    // Job processed, check for the next one immediately
                    tracing::debug!("Job processed, checking for next job");
                    continue;
                }
                Ok(TickOutcome::Idle) => {
                    tracing::trace!("No jobs available, sleeping");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Tick aborted, will retry");
                }
            }

            tokio::select! {
                _ = sleep(self.config.poll_interval()) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!("Worker stopped");
    }

    /// Lease at most one job, run it, and report the outcome.
    ///
    /// Errors are transport problems with the queue service. When one
    /// happens after the handler ran, the job's outcome is unknown to this
    /// worker and nothing further is reported.
    pub async fn tick(&self) -> Result<TickOutcome, ClientError> {
        let Some(job) = self.client.lease(&self.config.job_types).await? else {
            return Ok(TickOutcome::Idle);
        };

        tracing::info!(
            job_id = job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            "Processing job"
        );

        let started = Instant::now();
        let outcome = self.dispatch(&job).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                self.client.complete(job.id, result).await?;
                metrics::counter!("worker_jobs_processed_total", "outcome" => "completed").increment(1);
                tracing::info!(job_id = job.id, elapsed_ms, "Job completed successfully");
                Ok(TickOutcome::Completed(job.id))
            }
            Err(failure) => {
                self.client
                    .fail(job.id, &failure.message, failure.requeue, failure.delay_ms)
                    .await?;
                metrics::counter!("worker_jobs_processed_total", "outcome" => "failed").increment(1);
                tracing::warn!(
                    job_id = job.id,
                    elapsed_ms,
                    requeue = failure.requeue,
                    delay_ms = failure.delay_ms,
                    error = %failure.message,
                    "Job processing failed"
                );
                Ok(TickOutcome::Failed(job.id))
            }
        }
    }

    async fn dispatch(&self, job: &Job) -> Result<serde_json::Value, JobFailure> {
        let Some(handler) = self.handlers.get(&job.job_type) else {
            if self.config.reject_unknown_types {
                return Err(self.policy.permanent(format!(
                    "no handler registered for job type {}",
                    job.job_type
                )));
            }
            tracing::warn!(job_id = job.id, job_type = %job.job_type, "No handler registered, skipping job");
            return Ok(serde_json::json!({
                "skipped": true,
                "reason": "no handler registered",
                "type": job.job_type,
            }));
        };

        // Run on its own task so a panicking handler becomes a job failure
        // instead of taking the loop down.
        let task_job = job.clone();
        let policy = self.policy.clone();
        let handle =
            tokio::spawn(async move { handler.handle(&task_job, &policy).await });

        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Handler task aborted");
                Err(self.policy.permanent(format!("handler aborted: {e}")))
            }
        }
    }
}
