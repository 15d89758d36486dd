use async_trait::async_trait;

use crate::models::job::Job;
use crate::services::browser::{BrowseError, BrowserSession, PageSnapshot};

/// Performs the concrete action on a page the navigator has reached.
#[async_trait]
pub trait Actuator: Send + Sync {
    async fn perform(
        &self,
        session: &mut dyn BrowserSession,
        job: &Job,
        page: &PageSnapshot,
    ) -> Result<serde_json::Value, ActuatorError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("Action rejected by target: {0}")]
    Rejected(String),

    #[error(transparent)]
    Browse(#[from] BrowseError),
}

/// Reports the page it was handed without interacting with it.
pub struct PageProbeActuator;

#[async_trait]
impl Actuator for PageProbeActuator {
    async fn perform(
        &self,
        session: &mut dyn BrowserSession,
        job: &Job,
        page: &PageSnapshot,
    ) -> Result<serde_json::Value, ActuatorError> {
        tracing::info!(
            job_id = job.id,
            session_id = %session.id(),
            url = %page.final_url,
            title = page.title.as_deref().unwrap_or(""),
            "Target page reached"
        );

        Ok(serde_json::json!({
            "ok": true,
            "url": page.final_url,
            "status": page.status,
            "title": page.title,
        }))
    }
}
