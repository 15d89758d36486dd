use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::app_state::AppState;
use crate::routes::errors::ApiError;
use crate::services::queue_client::WORKER_SECRET_HEADER;

/// Reject requests whose `x-worker-secret` header does not exactly match
/// the configured secret.
pub async fn require_worker_secret(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized =
        presented_secret(req.headers()).is_some_and(|secret| secret == &*state.worker_secret);
    if !authorized {
        tracing::warn!(path = %req.uri().path(), "Rejected request with bad worker secret");
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

fn presented_secret(headers: &HeaderMap) -> Option<&str> {
    headers.get(WORKER_SECRET_HEADER)?.to_str().ok()
}
