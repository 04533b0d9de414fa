//! Core configuration types for capture runs
//!
//! This module contains the main `CaptureConfig` struct and the retry and
//! pacing settings it carries.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{
    CHROME_USER_AGENT, DEFAULT_MAX_CONCURRENT_TASKS, DEFAULT_RETRY_ATTEMPTS,
    DEFAULT_RETRY_BACKOFF_FACTOR, DEFAULT_RETRY_INITIAL_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
    DEFAULT_SCREENSHOTS_DIR, DEFAULT_TASK_TIMEOUT_SECS, DEFAULT_VIEWPORT_HEIGHT,
    DEFAULT_VIEWPORT_WIDTH,
};

/// Retry settings for one task attempt cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included. Never zero.
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Growth factor applied per failed attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_RETRY_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
            backoff_factor: DEFAULT_RETRY_BACKOFF_FACTOR,
        }
    }
}

/// Randomized pacing used by the chromium driver to look less like a bot.
///
/// All ranges are inclusive milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanizeConfig {
    /// Pause between typed characters
    pub keystroke_delay_ms: (u64, u64),
    /// Pause after clearing the search field
    pub clear_delay_ms: (u64, u64),
    /// Pause after a mistyped field before typing again
    pub mistype_delay_ms: (u64, u64),
    /// Pause after annotating the page, before capture
    pub settle_delay_ms: (u64, u64),
}

impl Default for HumanizeConfig {
    fn default() -> Self {
        Self {
            keystroke_delay_ms: (300, 700),
            clear_delay_ms: (200, 500),
            mistype_delay_ms: (500, 1000),
            settle_delay_ms: (500, 1000),
        }
    }
}

impl HumanizeConfig {
    /// No pauses at all. Useful for local fixtures.
    #[must_use]
    pub fn instant() -> Self {
        Self {
            keystroke_delay_ms: (0, 0),
            clear_delay_ms: (0, 0),
            mistype_delay_ms: (0, 0),
            settle_delay_ms: (0, 0),
        }
    }
}

/// Main configuration struct for capture runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Root under which every run directory is created
    pub(crate) storage_dir: PathBuf,
    pub(crate) headless: bool,
    pub(crate) viewport_width: u32,
    pub(crate) viewport_height: u32,
    pub(crate) user_agent: String,

    /// Chrome user data directory. When unset every session gets a fresh,
    /// uniquely named profile that is removed when the session closes.
    pub(crate) chrome_data_dir: Option<PathBuf>,

    /// Wave size *C*: tasks dispatched together before the next wave starts
    pub(crate) max_concurrent_tasks: usize,
    pub(crate) retry: RetryConfig,

    /// Deadline for a whole attempt cycle, measured from its first attempt
    pub(crate) task_timeout: Duration,

    /// Timeout for `page.goto()` and navigations triggered by a search
    pub(crate) navigation_timeout: Duration,
    /// How long to wait for the search field and trigger to appear
    pub(crate) element_timeout: Duration,
    /// Results area wait for sites that render in place
    pub(crate) results_timeout: Duration,
    /// Results area wait for sites that navigate after the search
    pub(crate) results_navigation_timeout: Duration,
    /// Window an operator gets to solve a challenge on flagged sites
    pub(crate) challenge_timeout: Duration,

    /// Type-and-verify rounds before the field is declared unreachable
    pub(crate) max_typing_rounds: u32,
    pub(crate) humanize: HumanizeConfig,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_SCREENSHOTS_DIR),
            headless: true,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            user_agent: CHROME_USER_AGENT.to_string(),
            chrome_data_dir: None,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            retry: RetryConfig::default(),
            task_timeout: Duration::from_secs(DEFAULT_TASK_TIMEOUT_SECS),
            navigation_timeout: Duration::from_secs(30),
            element_timeout: Duration::from_secs(30),
            results_timeout: Duration::from_secs(5),
            results_navigation_timeout: Duration::from_secs(10),
            challenge_timeout: Duration::from_secs(120),
            max_typing_rounds: 3,
            humanize: HumanizeConfig::default(),
        }
    }
}
