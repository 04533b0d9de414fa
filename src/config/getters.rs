//! Getter methods for `CaptureConfig`

use std::path::PathBuf;
use std::time::Duration;

use super::types::{CaptureConfig, HumanizeConfig, RetryConfig};

impl CaptureConfig {
    #[must_use]
    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    /// Viewport as `(width, height)`
    #[must_use]
    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn chrome_data_dir(&self) -> Option<&PathBuf> {
        self.chrome_data_dir.as_ref()
    }

    #[must_use]
    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks
    }

    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    #[must_use]
    pub fn element_timeout(&self) -> Duration {
        self.element_timeout
    }

    /// Results wait, depending on whether the site navigates after searching
    #[must_use]
    pub fn results_timeout(&self, navigation_expected: bool) -> Duration {
        if navigation_expected {
            self.results_navigation_timeout
        } else {
            self.results_timeout
        }
    }

    #[must_use]
    pub fn challenge_timeout(&self) -> Duration {
        self.challenge_timeout
    }

    #[must_use]
    pub fn max_typing_rounds(&self) -> u32 {
        self.max_typing_rounds
    }

    #[must_use]
    pub fn humanize(&self) -> &HumanizeConfig {
        &self.humanize
    }
}
