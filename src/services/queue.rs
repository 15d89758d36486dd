use chrono::{DateTime, Duration, Utc};

use crate::models::job::{Job, JobId, JobStatus, NewJob};
use crate::store::{JobStore, StatusCounts};

/// Lifecycle and ordering rules over the job store.
///
/// The service never retries on its own; requeue decisions come from the
/// worker and are only recorded here. Reports about unknown or already
/// resolved jobs are accepted and ignored, so a worker that lost its
/// connection can safely send the same report twice.
pub struct JobQueue {
    store: JobStore,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self {
            store: JobStore::new(),
        }
    }

    /// Add a pending job.
    pub async fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        priority: i64,
    ) -> Job {
        let job = self
            .store
            .create(NewJob {
                job_type: job_type.into(),
                payload,
                priority,
            })
            .await;

        metrics::counter!("jobs_enqueued_total").increment(1);
        self.record_depth().await;

        tracing::info!(
            job_id = job.id,
            job_type = %job.job_type,
            priority = job.priority,
            "Job enqueued"
        );

        job
    }

    /// Claim the next eligible job for a worker.
    ///
    /// Eligible means pending, past its retry delay, and of an accepted type
    /// (an empty `types` slice accepts every type).
    pub async fn lease(&self, types: &[String]) -> Option<Job> {
        let now = Utc::now();
        let job = self
            .store
            .claim_first(
                |job| {
                    job.is_leasable_at(now)
                        && (types.is_empty() || types.iter().any(|t| *t == job.job_type))
                },
                |job| {
                    job.status = JobStatus::Processing;
                    job.started_at = Some(now);
                },
            )
            .await;

        match &job {
            Some(job) => {
                metrics::counter!("jobs_leased_total").increment(1);
                self.record_depth().await;
                tracing::info!(
                    job_id = job.id,
                    job_type = %job.job_type,
                    attempts = job.attempts,
                    "Job leased"
                );
            }
            None => tracing::trace!("No eligible job to lease"),
        }

        job
    }

    /// Mark a processing job as completed. Any other state is left untouched.
    pub async fn complete(&self, id: JobId, result: serde_json::Value) {
        let applied = self
            .store
            .mutate(id, |job| {
                if job.status != JobStatus::Processing {
                    return false;
                }
                job.status = JobStatus::Completed;
                job.completed_at = Some(Utc::now());
                job.result = Some(result);
                true
            })
            .await;

        match applied {
            Some(true) => {
                metrics::counter!("jobs_completed_total").increment(1);
                tracing::info!(job_id = id, "Job completed");
            }
            Some(false) => tracing::debug!(job_id = id, "Ignoring completion for job not in processing"),
            None => tracing::warn!(job_id = id, "Ignoring completion for unknown job"),
        }
    }

    /// Record a failed attempt, either requeueing after `delay_ms` or
    /// failing the job permanently.
    pub async fn fail(&self, id: JobId, error: &str, requeue: bool, delay_ms: u64) {
        let now = Utc::now();
        let retry_at = i64::try_from(delay_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .and_then(|delay| now.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let applied = self
            .store
            .mutate(id, |job| {
                if job.status != JobStatus::Processing {
                    return None;
                }
                job.last_error = Some(error.to_string());
                if requeue {
                    job.status = JobStatus::Pending;
                    job.attempts += 1;
                    job.next_retry_at = Some(retry_at);
                    job.started_at = None;
                } else {
                    job.status = JobStatus::Failed;
                    job.failed_at = Some(now);
                    job.error = Some(error.to_string());
                }
                Some(job.attempts)
            })
            .await;

        match applied {
            Some(Some(attempts)) if requeue => {
                metrics::counter!("jobs_requeued_total").increment(1);
                self.record_depth().await;
                tracing::info!(job_id = id, attempts, delay_ms, error, "Job requeued for retry");
            }
            Some(Some(attempts)) => {
                metrics::counter!("jobs_failed_total").increment(1);
                tracing::warn!(job_id = id, attempts, error, "Job failed permanently");
            }
            Some(None) => tracing::debug!(job_id = id, "Ignoring failure for job not in processing"),
            None => tracing::warn!(job_id = id, "Ignoring failure for unknown job"),
        }
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.store.get(id).await
    }

    pub async fn stats(&self) -> StatusCounts {
        self.store.count_by_status().await
    }

    async fn record_depth(&self) {
        let counts = self.store.count_by_status().await;
        metrics::gauge!("queue_pending_jobs").set(counts.pending as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn payload() -> serde_json::Value {
        serde_json::json!({ "profileUrl": "https://x/in/y" })
    }

    #[tokio::test]
    async fn test_lease_prefers_higher_priority() {
        let queue = JobQueue::new();
        let a = queue.enqueue("SEND_CONNECTION", payload(), 1).await;
        let b = queue.enqueue("SEND_CONNECTION", payload(), 5).await;

        assert_eq!(queue.lease(&[]).await.unwrap().id, b.id);
        assert_eq!(queue.lease(&[]).await.unwrap().id, a.id);
        assert!(queue.lease(&[]).await.is_none());
    }

    #[tokio::test]
    async fn test_equal_priority_is_fifo() {
        let queue = JobQueue::new();
        let mut expected = Vec::new();
        for _ in 0..5 {
            expected.push(queue.enqueue("t", payload(), 3).await.id);
        }
        queue.enqueue("t", payload(), 0).await;

        let mut leased = Vec::new();
        for _ in 0..5 {
            leased.push(queue.lease(&[]).await.unwrap().id);
        }
        assert_eq!(leased, expected);
    }

    #[tokio::test]
    async fn test_lease_filters_by_type() {
        let queue = JobQueue::new();
        queue.enqueue("OTHER", payload(), 10).await;
        let wanted = queue.enqueue("SEND_CONNECTION", payload(), 1).await;

        let job = queue.lease(&["SEND_CONNECTION".to_string()]).await.unwrap();
        assert_eq!(job.id, wanted.id);
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());
    }

    #[tokio::test]
    async fn test_terminal_jobs_are_never_leased_again() {
        let queue = JobQueue::new();
        let a = queue.enqueue("t", payload(), 1).await;
        let b = queue.enqueue("t", payload(), 1).await;

        queue.lease(&[]).await.unwrap();
        queue.complete(a.id, serde_json::json!({ "ok": true })).await;
        queue.lease(&[]).await.unwrap();
        queue.fail(b.id, "boom", false, 0).await;

        assert!(queue.lease(&[]).await.is_none());
        assert_eq!(queue.get(a.id).await.unwrap().status, JobStatus::Completed);
        let failed = queue.get(b.id).await.unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.failed_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_is_idempotent() {
        let queue = JobQueue::new();
        let job = queue.enqueue("t", payload(), 1).await;
        queue.lease(&[]).await.unwrap();

        queue.complete(job.id, serde_json::json!({ "ok": true })).await;
        let first = queue.get(job.id).await.unwrap();
        queue.complete(job.id, serde_json::json!({ "ok": false })).await;
        let second = queue.get(job.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(second.result, Some(serde_json::json!({ "ok": true })));
    }

    #[tokio::test]
    async fn test_reports_for_unknown_jobs_are_ignored() {
        let queue = JobQueue::new();
        queue.complete(42, serde_json::Value::Null).await;
        queue.fail(42, "gone", true, 0).await;
        assert!(queue.get(42).await.is_none());
    }

    #[tokio::test]
    async fn test_pending_job_cannot_be_completed() {
        let queue = JobQueue::new();
        let job = queue.enqueue("t", payload(), 1).await;
        queue.complete(job.id, serde_json::json!({})).await;
        assert_eq!(queue.get(job.id).await.unwrap().status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn test_requeue_sets_retry_metadata() {
        let queue = JobQueue::new();
        let job = queue.enqueue("t", payload(), 1).await;
        queue.lease(&[]).await.unwrap();

        let before = Utc::now();
        queue.fail(job.id, "timeout", true, 1000).await;
        let job = queue.get(job.id).await.unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.last_error.as_deref(), Some("timeout"));
        let retry_at = job.next_retry_at.unwrap();
        assert!(retry_at >= before + Duration::milliseconds(1000));
        assert!(retry_at <= Utc::now() + Duration::milliseconds(1000));
    }

    #[tokio::test]
    async fn test_requeued_job_waits_for_retry_delay() {
        let queue = JobQueue::new();
        let delayed = queue.enqueue("t", payload(), 9).await;
        let other = queue.enqueue("t", payload(), 1).await;

        queue.lease(&[]).await.unwrap();
        queue.fail(delayed.id, "walled", true, 60_000).await;

        assert_eq!(queue.lease(&[]).await.unwrap().id, other.id);
        assert!(queue.lease(&[]).await.is_none());
    }

    #[tokio::test]
    async fn test_zero_delay_requeue_is_immediately_eligible() {
        let queue = JobQueue::new();
        let job = queue.enqueue("t", payload(), 1).await;
        queue.lease(&[]).await.unwrap();
        queue.fail(job.id, "flaky", true, 0).await;

        let again = queue.lease(&[]).await.unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_leases_claim_single_job_once() {
        for _ in 0..20 {
            let queue = Arc::new(JobQueue::new());
            queue.enqueue("t", payload(), 1).await;

            let leases = (0..16).map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.lease(&[]).await })
            });

            let claimed = futures::future::join_all(leases)
                .await
                .into_iter()
                .filter(|r| matches!(r, Ok(Some(_))))
                .count();
            assert_eq!(claimed, 1);
        }
    }

    #[tokio::test]
    async fn test_stats_track_statuses() {
        let queue = JobQueue::new();
        let a = queue.enqueue("t", payload(), 1).await;
        queue.enqueue("t", payload(), 1).await;
        queue.lease(&[]).await.unwrap();
        queue.complete(a.id, serde_json::json!({})).await;

        let stats = queue.stats().await;
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 0);
    }
}
