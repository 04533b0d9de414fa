//! Browser teardown
//!
//! Closing a chromium session is three steps that each may fail on their own:
//! ask the browser to close, wait for the process to exit, then remove the
//! profile directory. All three are attempted; failures are collected.

use chromiumoxide::Browser;
use log::{debug, warn};

use crate::browser_profile::BrowserProfile;

/// Result of cleanup operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupResult {
    Success,
    /// Some steps failed, with one message per failed step
    PartialFailure(Vec<String>),
}

/// Close the browser, wait for it to exit, then drop its profile directory
pub async fn cleanup_browser_and_data(mut browser: Browser, profile: BrowserProfile) -> CleanupResult {
    let mut errors = Vec::new();

    debug!(target: "sitecapture::cleanup", "Closing browser");
    if let Err(e) = browser.close().await {
        warn!(target: "sitecapture::cleanup", "Failed to close browser: {e}");
        errors.push(format!("Browser close failed: {e}"));
    }

    // Chrome holds profile files open until the process is gone
    debug!(target: "sitecapture::cleanup", "Waiting for browser process to exit");
    if let Err(e) = browser.wait().await {
        warn!(target: "sitecapture::cleanup", "Failed to wait for browser exit: {e}");
        errors.push(format!("Browser wait failed: {e}"));
    }

    if profile.is_ephemeral() {
        let path = profile.path().to_path_buf();
        profile.remove();
        if path.exists() {
            errors.push(format!("Profile directory {} was not removed", path.display()));
        }
    }

    if errors.is_empty() {
        CleanupResult::Success
    } else {
        CleanupResult::PartialFailure(errors)
    }
}
