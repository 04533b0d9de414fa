//! Builder methods available for all states
//!
//! This module contains methods that can be called on the builder
//! regardless of its current type state.

use std::path::PathBuf;
use std::time::Duration;

use super::builder::CaptureConfigBuilder;
use super::types::{CaptureConfig, HumanizeConfig, RetryConfig};

impl<State> CaptureConfigBuilder<State> {
    /// Set browser headless mode (visible vs invisible browser window)
    ///
    /// Headed mode is needed for sites flagged as requiring a manual
    /// challenge: the operator solves it in the visible window while the
    /// driver waits for the search field.
    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.settings.headless = headless;
        self
    }

    #[must_use]
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.settings.viewport_width = width;
        self.settings.viewport_height = height;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.settings.user_agent = user_agent.into();
        self
    }

    /// Pin the Chrome profile directory instead of a fresh one per session
    #[must_use]
    pub fn chrome_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.chrome_data_dir = Some(dir.into());
        self
    }

    /// Set the wave size
    ///
    /// Tasks are dispatched in fixed batches of this size; a batch only
    /// starts once every task of the previous batch reached a terminal state.
    #[must_use]
    pub fn max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.settings.max_concurrent_tasks = limit;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.settings.retry = retry;
        self
    }

    /// Total attempts per task, the first one included
    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.settings.retry.max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.settings.retry.backoff_factor = factor;
        self
    }

    /// Deadline for an entire attempt cycle
    ///
    /// The deadline covers every retry and backoff delay of the task. When it
    /// fires the task fails and the browser session is recycled before the
    /// next wave.
    #[must_use]
    pub fn task_timeout(mut self, timeout: Duration) -> Self {
        self.settings.task_timeout = timeout;
        self
    }

    #[must_use]
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.settings.navigation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn element_timeout(mut self, timeout: Duration) -> Self {
        self.settings.element_timeout = timeout;
        self
    }

    /// Results waits for in-place sites and for navigating sites
    #[must_use]
    pub fn results_timeouts(mut self, in_place: Duration, with_navigation: Duration) -> Self {
        self.settings.results_timeout = in_place;
        self.settings.results_navigation_timeout = with_navigation;
        self
    }

    #[must_use]
    pub fn challenge_timeout(mut self, timeout: Duration) -> Self {
        self.settings.challenge_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_typing_rounds(mut self, rounds: u32) -> Self {
        self.settings.max_typing_rounds = rounds;
        self
    }

    #[must_use]
    pub fn humanize(mut self, humanize: HumanizeConfig) -> Self {
        self.settings.humanize = humanize;
        self
    }
}

impl CaptureConfig {
    #[must_use]
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Override the wave size; call `validate()` afterwards
    #[must_use]
    pub fn with_max_concurrent_tasks(mut self, limit: usize) -> Self {
        self.max_concurrent_tasks = limit;
        self
    }

    /// Return a copy that uses a fixed Chrome profile directory
    #[must_use]
    pub fn with_chrome_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.chrome_data_dir = Some(dir.into());
        self
    }
}
