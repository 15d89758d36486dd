use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::models::api::{
    AckResponse, CompleteRequest, EnqueueRequest, EnqueueResponse, FailRequest, JobResponse,
    LeaseRequest, LeaseResponse,
};
use crate::models::job::{Job, JobId};

/// Header carrying the shared worker secret.
pub const WORKER_SECRET_HEADER: &str = "x-worker-secret";

/// HTTP client for the queue service.
#[derive(Clone)]
pub struct QueueClient {
    http: Client,
    base_url: String,
    secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Queue service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Queue service rejected the worker secret")]
    Unauthorized,

    #[error("Queue service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl QueueClient {
    /// Every request made through this client is bounded by `timeout`.
    pub fn new(
        base_url: impl Into<String>,
        secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            secret: secret.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(WORKER_SECRET_HEADER, &self.secret)
    }

    /// Claim the next job among `types` (empty accepts all).
    pub async fn lease(&self, types: &[String]) -> Result<Option<Job>, ClientError> {
        let body = LeaseRequest {
            types: (!types.is_empty()).then(|| types.to_vec()),
        };
        let response = self
            .authed(self.http.post(self.url("/jobs/next")))
            .json(&body)
            .send()
            .await?;
        let lease: LeaseResponse = parse(response).await?;
        Ok(lease.job)
    }

    pub async fn complete(&self, id: JobId, result: serde_json::Value) -> Result<(), ClientError> {
        let response = self
            .authed(self.http.post(self.url(&format!("/jobs/{id}/complete"))))
            .json(&CompleteRequest { result })
            .send()
            .await?;
        let _: AckResponse = parse(response).await?;
        Ok(())
    }

    pub async fn fail(
        &self,
        id: JobId,
        error: &str,
        requeue: bool,
        delay_ms: u64,
    ) -> Result<(), ClientError> {
        let body = FailRequest {
            error: error.to_string(),
            requeue,
            delay_ms,
        };
        let response = self
            .authed(self.http.post(self.url(&format!("/jobs/{id}/fail"))))
            .json(&body)
            .send()
            .await?;
        let _: AckResponse = parse(response).await?;
        Ok(())
    }

    /// Producer-side enqueue. Needs no secret.
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: serde_json::Value,
        priority: Option<i64>,
    ) -> Result<Job, ClientError> {
        let body = EnqueueRequest {
            job_type: job_type.to_string(),
            payload,
            priority,
        };
        let response = self.http.post(self.url("/jobs")).json(&body).send().await?;
        let created: EnqueueResponse = parse(response).await?;
        Ok(created.job)
    }

    /// Status query. `None` when the service does not know the job.
    pub async fn get(&self, id: JobId) -> Result<Option<Job>, ClientError> {
        let response = self.http.get(self.url(&format!("/jobs/{id}"))).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let found: JobResponse = parse(response).await?;
        Ok(Some(found.job))
    }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(ClientError::Unauthorized);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ClientError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<T>().await?)
}
