use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::models::job::Job;

/// Body of `POST /jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnqueueRequest {
    #[serde(rename = "type")]
    #[garde(length(min = 1, max = 128))]
    pub job_type: String,

    #[serde(default)]
    #[garde(skip)]
    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub priority: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub success: bool,
    pub job: Job,
}

/// Body of `POST /jobs/next`. An empty or absent list accepts every type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaseRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LeaseResponse {
    pub ok: bool,
    pub job: Option<Job>,
}

/// Body of `POST /jobs/{id}/complete`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteRequest {
    #[serde(default)]
    pub result: serde_json::Value,
}

/// Body of `POST /jobs/{id}/fail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequest {
    pub error: String,
    #[serde(default)]
    pub requeue: bool,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Acknowledgement for complete/fail.
#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
}

/// Response for `GET /jobs/{id}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub success: bool,
    pub job: Job,
}

/// Structured error body returned by every failing route.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub message: String,
}
