//! Environment overrides for `CaptureConfig`
//!
//! Recognized variables: `SCREENSHOTS_DIR`, `HEADLESS`, `DEFAULT_VIEWPORT_WIDTH`,
//! `DEFAULT_VIEWPORT_HEIGHT`, `RETRY_ATTEMPTS`, `MAX_CONCURRENT_TASKS`,
//! `TASK_TIMEOUT_SECS` and `CHROMIUM_DATA_DIR`. Unset variables keep defaults.

use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

use super::builder::validate;
use super::types::CaptureConfig;

/// Interpret common truthy spellings (`true`, `1`, `yes`). Anything else is false.
#[must_use]
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes"
    )
}

fn parse_number<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{name} must be a number, got {value:?}"))
}

impl CaptureConfig {
    /// Build a configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    ///
    /// Kept separate from `from_env` so callers and tests can feed a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = CaptureConfig::default();

        if let Some(dir) = lookup("SCREENSHOTS_DIR").filter(|v| !v.trim().is_empty()) {
            config.storage_dir = dir.into();
        }
        if let Some(value) = lookup("HEADLESS") {
            config.headless = parse_bool(&value);
        }
        if let Some(value) = lookup("DEFAULT_VIEWPORT_WIDTH") {
            config.viewport_width = parse_number("DEFAULT_VIEWPORT_WIDTH", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_VIEWPORT_HEIGHT") {
            config.viewport_height = parse_number("DEFAULT_VIEWPORT_HEIGHT", &value)?;
        }
        if let Some(value) = lookup("RETRY_ATTEMPTS") {
            config.retry.max_attempts = parse_number("RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = lookup("MAX_CONCURRENT_TASKS") {
            config.max_concurrent_tasks = parse_number("MAX_CONCURRENT_TASKS", &value)?;
        }
        if let Some(value) = lookup("TASK_TIMEOUT_SECS") {
            config.task_timeout =
                Duration::from_secs(parse_number("TASK_TIMEOUT_SECS", &value)?);
        }
        if let Some(dir) = lookup("CHROMIUM_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            config.chrome_data_dir = Some(dir.into());
        }

        validate(&config)?;
        Ok(config)
    }
}
