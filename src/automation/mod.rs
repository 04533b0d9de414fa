//! Automation capability consumed by the crawl engine
//!
//! The orchestrator never talks to a browser directly. It drives an
//! [`AutomationDriver`]: a long-lived session, isolated pages opened against
//! it, and the handful of page interactions a search-and-capture needs.
//! [`ChromiumDriver`] is the production implementation; tests plug in
//! scripted drivers.

pub mod chromium;
pub mod cleanup;
pub mod page_guard;
pub mod session_pool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

use crate::utils::format_display_time;

pub use chromium::{ChromiumDriver, ChromiumSession};
pub use page_guard::PageGuard;
pub use session_pool::{SessionPool, SessionState};

/// Failures reported by an automation driver
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// The shared session is missing, dead, or could not be launched
    #[error("automation session unavailable: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// The field never appeared, or never held the requested text
    #[error("search field '{locator}' not usable: {message}")]
    Field { locator: String, message: String },

    /// A trigger could not be found or clicked
    #[error("interaction with '{locator}' failed: {message}")]
    Interaction { locator: String, message: String },

    #[error("screenshot capture failed: {0}")]
    Capture(String),
}

impl DriverError {
    /// Whether a fresh attempt has a realistic chance of succeeding
    ///
    /// Missing selectors and a dead session do not heal between attempts.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Navigation { .. } | Self::Capture(_))
    }
}

/// Footer stamped onto a page right before it is captured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Watermark {
    pub site: String,
    pub entity: String,
    pub queried_at: DateTime<Utc>,
}

impl Watermark {
    /// Banner text: `Site: … | Entity: … | Queried: …`
    #[must_use]
    pub fn text(&self) -> String {
        format!(
            "Site: {} | Entity: {} | Queried: {}",
            self.site,
            self.entity,
            format_display_time(self.queried_at)
        )
    }
}

/// Browser automation as seen by the orchestrator
///
/// A driver owns no run state. Sessions and pages are handed out as values
/// and handed back for teardown; [`SessionPool`] and [`PageGuard`] make sure
/// that happens on every exit path.
#[async_trait]
pub trait AutomationDriver: Send + Sync + 'static {
    /// The shared, expensive resource (one browser)
    type Session: Send + Sync + 'static;
    /// One isolated tab, owned by exactly one task
    type Page: Send + Sync + 'static;

    async fn open_session(&self) -> Result<Self::Session, DriverError>;

    /// Tear the session down. Failures are logged, not returned.
    async fn close_session(&self, session: Self::Session);

    /// Cheap liveness probe used before reusing a session
    async fn is_alive(&self, _session: &Self::Session) -> bool {
        true
    }

    async fn open_page(&self, session: &Self::Session) -> Result<Self::Page, DriverError>;

    async fn close_page(&self, page: Self::Page);

    async fn navigate(&self, page: &Self::Page, url: &str) -> Result<(), DriverError>;

    /// Wait until `locator` matches, failing with [`DriverError::Field`]
    async fn wait_for_element(
        &self,
        page: &Self::Page,
        locator: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Replace the field content with `text`
    ///
    /// Succeeds only once the field is verified to hold exactly `text`.
    async fn type_into_field(
        &self,
        page: &Self::Page,
        locator: &str,
        text: &str,
    ) -> Result<(), DriverError>;

    /// Click the trigger and wait for results to render
    ///
    /// A results area that never shows up is not an error; the caller still
    /// captures whatever the page displays.
    async fn click_and_await_results(
        &self,
        page: &Self::Page,
        trigger: &str,
        results: &str,
        navigation_expected: bool,
    ) -> Result<(), DriverError>;

    async fn annotate(&self, page: &Self::Page, watermark: &Watermark) -> Result<(), DriverError>;

    /// Full-page PNG
    async fn capture_full_page(&self, page: &Self::Page) -> Result<Vec<u8>, DriverError>;
}
