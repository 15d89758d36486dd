//! Resilient navigation against a detection-sensitive target.
//!
//! Each job gets one browser session and at most `max_attempts` visits to
//! the target. Between failed attempts the navigator waits a jittered delay
//! and visits the target's root page, so retries never run on a fixed
//! cadence and always reach the target from a neutral page.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::Url;
use tokio::time::{sleep, timeout};

use crate::config::WorkerConfig;
use crate::models::job::Job;
use crate::services::actuator::{Actuator, ActuatorError};
use crate::services::browser::{BrowseError, Browser, BrowserSession, PageSnapshot};

/// Title phrases, matched as whole words.
const DEFAULT_TITLE_MARKERS: &[&str] = &[
    "sign in",
    "log in",
    "login",
    "sign up",
    "join now",
    "security verification",
    "captcha",
    "authwall",
    "access denied",
];

/// Path segments that only appear on walls.
const DEFAULT_PATH_SEGMENTS: &[&str] = &["authwall", "login", "checkpoint"];

const DEFAULT_PATH_PREFIXES: &[&str] = &["/uas/"];

/// Randomized delay of `base ± jitter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub jitter: Duration,
}

impl Backoff {
    pub fn next_delay(&self, rng: &mut impl Rng) -> Duration {
        if self.jitter.is_zero() {
            return self.base;
        }
        let base = self.base.as_millis() as u64;
        let jitter = self.jitter.as_millis() as u64;
        let lower = base.saturating_sub(jitter);
        let upper = base.saturating_add(jitter);
        Duration::from_millis(rng.gen_range(lower..=upper))
    }
}

#[derive(Debug, Clone)]
pub struct NavigatorConfig {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Backoff,
    /// Pause after the soft-reset visit.
    pub settle_delay: Duration,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(30),
            backoff: Backoff {
                base: Duration::from_millis(1200),
                jitter: Duration::from_millis(800),
            },
            settle_delay: Duration::from_secs(1),
        }
    }
}

impl From<&WorkerConfig> for NavigatorConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_attempts: config.nav_max_attempts,
            attempt_timeout: Duration::from_millis(config.nav_timeout_ms),
            backoff: Backoff {
                base: Duration::from_millis(config.nav_backoff_base_ms),
                jitter: Duration::from_millis(config.nav_backoff_jitter_ms),
            },
            settle_delay: Duration::from_millis(config.nav_settle_ms),
        }
    }
}

/// Recognizes pages where the target refuses access (login or verification walls).
///
/// Title markers match whole words only, so a name like "Loginov" is not a
/// wall. URL markers match complete path segments or a path prefix.
#[derive(Debug, Clone)]
pub struct WallDetector {
    title_markers: Vec<Vec<String>>,
    path_segments: Vec<String>,
    path_prefixes: Vec<String>,
    labels: Vec<String>,
}

impl Default for WallDetector {
    fn default() -> Self {
        Self::new(
            DEFAULT_TITLE_MARKERS,
            DEFAULT_PATH_SEGMENTS,
            DEFAULT_PATH_PREFIXES,
        )
    }
}

impl WallDetector {
    pub fn new(title_markers: &[&str], path_segments: &[&str], path_prefixes: &[&str]) -> Self {
        let labels = title_markers
            .iter()
            .chain(path_segments)
            .chain(path_prefixes)
            .map(|m| m.to_lowercase())
            .collect();
        Self {
            title_markers: title_markers.iter().map(|m| words(m)).collect(),
            path_segments: path_segments.iter().map(|m| m.to_lowercase()).collect(),
            path_prefixes: path_prefixes.iter().map(|m| m.to_lowercase()).collect(),
            labels,
        }
    }

    /// The marker that identifies `page` as a wall, if any.
    pub fn wall_marker(&self, page: &PageSnapshot) -> Option<&str> {
        let title = words(page.title.as_deref().unwrap_or_default());
        let path = Url::parse(&page.final_url)
            .map(|u| u.path().to_lowercase())
            .unwrap_or_default();

        let title_hit = self
            .title_markers
            .iter()
            .position(|marker| !marker.is_empty() && title.windows(marker.len()).any(|w| w == marker.as_slice()));
        if let Some(index) = title_hit {
            return Some(self.labels[index].as_str());
        }

        let offset = self.title_markers.len();
        let segment_hit = self
            .path_segments
            .iter()
            .position(|marker| path.split('/').any(|segment| segment == marker));
        if let Some(index) = segment_hit {
            return Some(self.labels[offset + index].as_str());
        }

        let offset = offset + self.path_segments.len();
        self.path_prefixes
            .iter()
            .position(|prefix| path.starts_with(prefix.as_str()))
            .map(|index| self.labels[offset + index].as_str())
    }
}

/// Lowercased alphanumeric words of `text`.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Why a single attempt did not reach the target.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AttemptFailure {
    #[error("blocked by wall ({marker}), title: {}", .title.as_deref().unwrap_or("-"))]
    Blocked { marker: String, title: Option<String> },

    #[error("target returned HTTP {0}")]
    HttpStatus(u16),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NavigationError {
    #[error("Invalid navigation target: {0}")]
    InvalidTarget(String),

    #[error("Browser session unavailable: {0}")]
    Session(#[from] BrowseError),

    #[error("Navigation failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: AttemptFailure },

    #[error("Action failed: {0}")]
    Actuator(#[from] ActuatorError),
}

impl NavigationError {
    /// Whether retrying the whole job later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            NavigationError::Exhausted { .. } | NavigationError::Session(_)
        )
    }
}

/// Candidate addresses for `target`: the target itself, then the same URL
/// with the `www.` host prefix toggled.
pub fn address_variants(target: &str) -> Result<Vec<String>, NavigationError> {
    let primary = parse_target(target)?;
    let mut variants = vec![primary.to_string()];

    if let Some(domain) = primary.domain() {
        let alternate_host = match domain.strip_prefix("www.") {
            Some(bare) => bare.to_string(),
            None => format!("www.{domain}"),
        };
        let mut alternate = primary.clone();
        if alternate.set_host(Some(&alternate_host)).is_ok() {
            variants.push(alternate.to_string());
        }
    }

    Ok(variants)
}

/// Root page of the target's origin, used for soft resets.
pub fn neutral_url(target: &str) -> Result<String, NavigationError> {
    let mut url = parse_target(target)?;
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

fn parse_target(target: &str) -> Result<Url, NavigationError> {
    let url = Url::parse(target)
        .map_err(|e| NavigationError::InvalidTarget(format!("{target}: {e}")))?;
    match url.scheme() {
        "http" | "https" if url.has_host() => Ok(url),
        _ => Err(NavigationError::InvalidTarget(format!(
            "{target}: expected an http(s) URL"
        ))),
    }
}

/// Owns a session and guarantees it is closed, even when the owning future
/// is dropped or unwinds before `release` runs.
struct SessionGuard {
    session: Option<Box<dyn BrowserSession>>,
}

impl SessionGuard {
    fn new(session: Box<dyn BrowserSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    fn session(&mut self) -> &mut dyn BrowserSession {
        self.session
            .as_deref_mut()
            .expect("session is held until released")
    }

    async fn release(mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::warn!(session_id = %session.id(), "Session dropped without release, closing");
                handle.spawn(async move { session.close().await });
            }
            Err(_) => {
                tracing::error!(session_id = %session.id(), "Session leaked: no runtime to close it on");
            }
        }
    }
}

pub struct Navigator {
    browser: Arc<dyn Browser>,
    config: NavigatorConfig,
    detector: WallDetector,
}

impl Navigator {
    pub fn new(browser: Arc<dyn Browser>, config: NavigatorConfig) -> Self {
        Self {
            browser,
            config: NavigatorConfig {
                max_attempts: config.max_attempts.max(1),
                ..config
            },
            detector: WallDetector::default(),
        }
    }

    pub fn with_detector(mut self, detector: WallDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    /// Open a session, reach `target`, hand the page to `actuator`, and close
    /// the session on every path.
    pub async fn run(
        &self,
        target: &str,
        job: &Job,
        actuator: &dyn Actuator,
    ) -> Result<serde_json::Value, NavigationError> {
        let started = Instant::now();
        let mut guard = SessionGuard::new(self.browser.open_session().await?);

        tracing::info!(
            job_id = job.id,
            session_id = %guard.session().id(),
            target_url = target,
            "Starting navigation"
        );

        let outcome = self.drive(guard.session(), target, job, actuator).await;
        guard.release().await;

        metrics::histogram!("navigation_seconds").record(started.elapsed().as_secs_f64());
        outcome
    }

    async fn drive(
        &self,
        session: &mut dyn BrowserSession,
        target: &str,
        job: &Job,
        actuator: &dyn Actuator,
    ) -> Result<serde_json::Value, NavigationError> {
        let page = self.navigate(session, target).await?;
        Ok(actuator.perform(session, job, &page).await?)
    }

    /// Attempt loop: returns the first page that is reachable and not walled.
    pub async fn navigate(
        &self,
        session: &mut dyn BrowserSession,
        target: &str,
    ) -> Result<PageSnapshot, NavigationError> {
        let variants = address_variants(target)?;
        let neutral = neutral_url(target)?;
        let max_attempts = self.config.max_attempts;
        let mut last_failure = None;

        for attempt in 0..max_attempts {
            let url = &variants[(attempt as usize).min(variants.len() - 1)];
            metrics::counter!("navigation_attempts_total").increment(1);

            match self.attempt(session, url).await {
                Ok(page) => {
                    tracing::info!(
                        attempt = attempt + 1,
                        url = %page.final_url,
                        status = page.status,
                        "Navigation succeeded"
                    );
                    return Ok(page);
                }
                Err(failure) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        url = %url,
                        error = %failure,
                        "Navigation attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }

            if attempt + 1 < max_attempts {
                let delay = self.config.backoff.next_delay(&mut rand::thread_rng());
                tracing::debug!(delay_ms = delay.as_millis() as u64, "Backing off before retry");
                sleep(delay).await;
                self.soft_reset(session, &neutral).await;
            }
        }

        Err(NavigationError::Exhausted {
            attempts: max_attempts,
            last_error: last_failure
                .unwrap_or_else(|| AttemptFailure::Transport("no attempt made".to_string())),
        })
    }

    async fn attempt(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<PageSnapshot, AttemptFailure> {
        let page = match timeout(self.config.attempt_timeout, session.visit(url)).await {
            Err(_) => return Err(AttemptFailure::TimedOut(self.config.attempt_timeout)),
            Ok(Err(e)) => return Err(AttemptFailure::Transport(e.to_string())),
            Ok(Ok(page)) => page,
        };

        if !page.is_success() {
            return Err(AttemptFailure::HttpStatus(page.status));
        }

        if let Some(marker) = self.detector.wall_marker(&page) {
            return Err(AttemptFailure::Blocked {
                marker: marker.to_string(),
                title: page.title.clone(),
            });
        }

        Ok(page)
    }

    /// Visit the neutral page and let it settle. Failures here only get logged.
    async fn soft_reset(&self, session: &mut dyn BrowserSession, neutral: &str) {
        match timeout(self.config.attempt_timeout, session.visit(neutral)).await {
            Ok(Ok(page)) => {
                tracing::debug!(url = neutral, status = page.status, "Soft reset visit done")
            }
            Ok(Err(e)) => tracing::debug!(url = neutral, error = %e, "Soft reset visit failed"),
            Err(_) => tracing::debug!(url = neutral, "Soft reset visit timed out"),
        }
        sleep(self.config.settle_delay).await;
    }
}
