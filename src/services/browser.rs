//! Browser sessions used by the navigator.
//!
//! A session is an expensive, stateful handle on the target (cookies,
//! connection pool, and in a full deployment a real browser process). The
//! navigator owns one session per job and always closes it.

use async_trait::async_trait;
use scraper::{Html, Selector};
use serde::Serialize;
use uuid::Uuid;

/// What a single page visit observed.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PageSnapshot {
    pub requested_url: String,
    pub final_url: String,
    pub status: u16,
    pub title: Option<String>,
}

impl PageSnapshot {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BrowseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to start browser session: {0}")]
    Launch(String),
}

#[async_trait]
pub trait BrowserSession: Send {
    fn id(&self) -> &str;

    /// Load `url` and report the resulting page.
    async fn visit(&mut self, url: &str) -> Result<PageSnapshot, BrowseError>;

    /// Release everything the session holds.
    async fn close(&mut self);
}

#[async_trait]
pub trait Browser: Send + Sync {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, BrowseError>;
}

/// Browser backed by plain HTTP requests with a per-session cookie jar.
pub struct HttpBrowser {
    user_agent: String,
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpBrowser {
    pub fn new() -> Self {
        Self {
            user_agent: concat!(
                "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 ",
                "(KHTML, like Gecko) Chrome/124.0 Safari/537.36"
            )
            .to_string(),
        }
    }

    pub fn with_user_agent(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
        }
    }
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn open_session(&self) -> Result<Box<dyn BrowserSession>, BrowseError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(&self.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| BrowseError::Launch(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        tracing::debug!(session_id = %id, "Browser session opened");

        Ok(Box::new(HttpSession {
            id,
            client: Some(client),
        }))
    }
}

struct HttpSession {
    id: String,
    client: Option<reqwest::Client>,
}

#[async_trait]
impl BrowserSession for HttpSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn visit(&mut self, url: &str) -> Result<PageSnapshot, BrowseError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| BrowseError::Launch("session already closed".to_string()))?;

        let response = client.get(url).send().await?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        Ok(PageSnapshot {
            requested_url: url.to_string(),
            final_url,
            status,
            title: extract_title(&body),
        })
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!(session_id = %self.id, "Browser session closed");
        }
    }
}

/// Text of the document `<title>`, whitespace-normalized.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let title_sel = Selector::parse("title").expect("valid selector");

    let title = document
        .select(&title_sel)
        .next()?
        .text()
        .collect::<Vec<_>>()
        .join(" ");
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");

    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
