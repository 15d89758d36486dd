//! Queue API scenarios over real HTTP.

mod helpers;

use helpers::{TestServer, SECRET};
use outreach_queue::models::job::JobStatus;
use outreach_queue::services::queue_client::{ClientError, QueueClient, WORKER_SECRET_HEADER};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_lease_returns_higher_priority_first() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let a = client.enqueue("SEND_CONNECTION", json!({}), Some(1)).await.unwrap();
    let b = client.enqueue("SEND_CONNECTION", json!({}), Some(5)).await.unwrap();

    assert_eq!(client.lease(&[]).await.unwrap().unwrap().id, b.id);
    assert_eq!(client.lease(&[]).await.unwrap().unwrap().id, a.id);
    assert!(client.lease(&[]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_send_connection_complete_then_status() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let job = client
        .enqueue("SEND_CONNECTION", json!({ "profileUrl": "https://x/in/y" }), None)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.priority, 1);

    let leased = client.lease(&[]).await.unwrap().unwrap();
    assert_eq!(leased.id, job.id);
    assert_eq!(leased.status, JobStatus::Processing);

    client.complete(job.id, json!({ "ok": true })).await.unwrap();
    // Duplicate report is accepted and changes nothing
    client.complete(job.id, json!({ "ok": false })).await.unwrap();

    let body: serde_json::Value = reqwest::get(server.url(&format!("/jobs/{}", job.id)))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["job"]["status"], "completed");
    assert_eq!(body["job"]["result"], json!({ "ok": true }));
    assert!(body["job"]["completedAt"].is_string());
}

#[tokio::test]
async fn test_fail_with_requeue_returns_job_to_pending() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let job = client.enqueue("SEND_CONNECTION", json!({}), None).await.unwrap();
    client.lease(&[]).await.unwrap().unwrap();
    client.fail(job.id, "timeout", true, 1000).await.unwrap();

    let job = client.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.last_error.as_deref(), Some("timeout"));
    assert!(job.next_retry_at.is_some());

    // Still inside the retry delay
    assert!(client.lease(&[]).await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(client.lease(&[]).await.unwrap().unwrap().id, job.id);
}

#[tokio::test]
async fn test_permanent_failure_is_terminal() {
    let server = TestServer::spawn().await;
    let client = server.client();

    let job = client.enqueue("SEND_CONNECTION", json!({}), None).await.unwrap();
    client.lease(&[]).await.unwrap().unwrap();
    client.fail(job.id, "profile not found", false, 0).await.unwrap();

    let job = client.get(job.id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.error.as_deref(), Some("profile not found"));
    assert!(client.lease(&[]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_lease_filters_by_type() {
    let server = TestServer::spawn().await;
    let client = server.client();

    client.enqueue("OTHER", json!({}), Some(10)).await.unwrap();
    let wanted = client.enqueue("SEND_CONNECTION", json!({}), Some(1)).await.unwrap();

    let leased = client
        .lease(&["SEND_CONNECTION".to_string()])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leased.id, wanted.id);
}

#[tokio::test]
async fn test_worker_routes_require_secret() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let missing = http
        .post(server.url("/jobs/next"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = missing.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "unauthorized");

    let wrong = http
        .post(server.url("/jobs/1/complete"))
        .header(WORKER_SECRET_HEADER, format!("{SECRET}-nope"))
        .json(&json!({ "result": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let intruder = QueueClient::new(&server.base_url, "wrong", Duration::from_secs(5)).unwrap();
    assert!(matches!(
        intruder.fail(1, "x", false, 0).await,
        Err(ClientError::Unauthorized)
    ));
}

#[tokio::test]
async fn test_unknown_job_returns_404() {
    let server = TestServer::spawn().await;

    let response = reqwest::get(server.url("/jobs/999")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "not_found");

    assert!(server.client().get(999).await.unwrap().is_none());
}

#[tokio::test]
async fn test_reports_for_unknown_jobs_succeed() {
    let server = TestServer::spawn().await;
    let client = server.client();

    tokio_test::assert_ok!(client.complete(404, json!({})).await);
    tokio_test::assert_ok!(client.fail(404, "gone", true, 0).await);
}

#[tokio::test]
async fn test_enqueue_rejects_empty_type() {
    let server = TestServer::spawn().await;

    let response = reqwest::Client::new()
        .post(server.url("/jobs"))
        .json(&json!({ "type": "", "payload": {} }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_health_reports_counts() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.enqueue("SEND_CONNECTION", json!({}), None).await.unwrap();
    client.enqueue("SEND_CONNECTION", json!({}), None).await.unwrap();
    client.lease(&[]).await.unwrap().unwrap();

    let body: serde_json::Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"]["pending"], 1);
    assert_eq!(body["jobs"]["processing"], 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_share_a_job() {
    let server = TestServer::spawn().await;
    let client = server.client();
    client.enqueue("SEND_CONNECTION", json!({}), None).await.unwrap();

    let leases = (0..8).map(|_| {
        let client = client.clone();
        tokio::spawn(async move { client.lease(&[]).await.unwrap() })
    });
    let claimed = futures::future::join_all(leases)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Some(_))))
        .count();
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn test_malformed_bodies_get_structured_errors() {
    let server = TestServer::spawn().await;
    let http = reqwest::Client::new();

    let not_json = http
        .post(server.url("/jobs"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = not_json.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].is_string());

    let no_body = http.post(server.url("/jobs")).send().await.unwrap();
    assert_eq!(no_body.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = no_body.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let bad_fail = http
        .post(server.url("/jobs/1/fail"))
        .header(WORKER_SECRET_HEADER, SECRET)
        .json(&json!({ "requeue": true }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_fail.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: serde_json::Value = bad_fail.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "validation_error");
}
