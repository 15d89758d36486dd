//! Test helpers: run the real queue router on an ephemeral port.

use outreach_queue::app_state::AppState;
use outreach_queue::routes;
use outreach_queue::services::queue::JobQueue;
use outreach_queue::services::queue_client::QueueClient;
use std::time::Duration;

pub const SECRET: &str = "test-worker-secret";

pub struct TestServer {
    pub base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        let app = routes::build_router(AppState::new(JobQueue::new(), SECRET));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    /// Client authenticated with the right secret.
    pub fn client(&self) -> QueueClient {
        QueueClient::new(&self.base_url, SECRET, Duration::from_secs(5)).unwrap()
    }

    #[allow(dead_code)]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
