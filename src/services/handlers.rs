use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use garde::Validate;
use serde::Deserialize;

use crate::config::WorkerConfig;
use crate::models::job::Job;
use crate::services::actuator::Actuator;
use crate::services::navigator::Navigator;

pub const SEND_CONNECTION: &str = "SEND_CONNECTION";

/// How a failed job should be reported back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub message: String,
    pub requeue: bool,
    pub delay_ms: u64,
}

/// Decides whether a failure is retried. Handlers receive it explicitly and
/// build every `JobFailure` through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub requeue_transient: bool,
    pub max_requeues: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            requeue_transient: false,
            max_requeues: 3,
            retry_delay_ms: 60_000,
        }
    }
}

impl From<&WorkerConfig> for RetryPolicy {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            requeue_transient: config.requeue_transient,
            max_requeues: config.max_requeues,
            retry_delay_ms: config.retry_delay_ms,
        }
    }
}

impl RetryPolicy {
    /// A failure that retrying cannot fix.
    pub fn permanent(&self, message: impl Into<String>) -> JobFailure {
        JobFailure {
            message: message.into(),
            requeue: false,
            delay_ms: 0,
        }
    }

    /// A failure that may clear up later. Requeued only while the policy
    /// allows it and the job has requeues left.
    pub fn transient(&self, job: &Job, message: impl Into<String>) -> JobFailure {
        if self.requeue_transient && job.attempts < self.max_requeues {
            JobFailure {
                message: message.into(),
                requeue: true,
                delay_ms: self.retry_delay_ms,
            }
        } else {
            self.permanent(message)
        }
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<serde_json::Value, JobFailure>;
}

/// Handlers keyed by job type.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.handlers.insert(job_type.into(), handler);
        self
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<_> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

/// Payload of a `SEND_CONNECTION` job.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendConnectionPayload {
    #[garde(url)]
    pub profile_url: String,

    #[serde(default)]
    #[garde(length(max = 300))]
    pub note: Option<String>,
}

/// Sends a connection request to the profile in the payload.
pub struct SendConnectionHandler {
    navigator: Arc<Navigator>,
    actuator: Arc<dyn Actuator>,
    soft_mode: bool,
}

impl SendConnectionHandler {
    pub fn new(navigator: Arc<Navigator>, actuator: Arc<dyn Actuator>, soft_mode: bool) -> Self {
        Self {
            navigator,
            actuator,
            soft_mode,
        }
    }
}

#[async_trait]
impl JobHandler for SendConnectionHandler {
    async fn handle(
        &self,
        job: &Job,
        policy: &RetryPolicy,
    ) -> Result<serde_json::Value, JobFailure> {
        let payload: SendConnectionPayload = serde_json::from_value(job.payload.clone())
            .map_err(|e| policy.permanent(format!("invalid payload: {e}")))?;
        payload
            .validate()
            .map_err(|e| policy.permanent(format!("invalid payload: {e}")))?;

        if self.soft_mode {
            tracing::info!(job_id = job.id, profile_url = %payload.profile_url, "Soft mode: skipping navigation");
            return Ok(serde_json::json!({
                "ok": true,
                "softMode": true,
                "profileUrl": payload.profile_url,
            }));
        }

        self.navigator
            .run(&payload.profile_url, job, self.actuator.as_ref())
            .await
            .map_err(|e| {
                if e.is_transient() {
                    policy.transient(job, e.to_string())
                } else {
                    policy.permanent(e.to_string())
                }
            })
    }
}
