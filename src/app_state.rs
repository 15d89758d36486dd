use std::sync::Arc;

use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    /// Shared secret expected in the `x-worker-secret` header.
    pub worker_secret: Arc<str>,
}

impl AppState {
    pub fn new(queue: JobQueue, worker_secret: impl Into<Arc<str>>) -> Self {
        Self {
            queue: Arc::new(queue),
            worker_secret: worker_secret.into(),
        }
    }
}
