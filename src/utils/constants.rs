//! Shared configuration constants for sitecapture
//!
//! Default values used by the config builder and the environment loader.

/// Default number of tasks dispatched per wave
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 2;

/// Default attempts per task attempt cycle (first attempt included)
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Delay before the second attempt
pub const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 2_000;

/// Upper bound for any backoff delay
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Multiplier applied to the delay after every failed attempt
pub const DEFAULT_RETRY_BACKOFF_FACTOR: f64 = 2.0;

/// Hard deadline for a whole attempt cycle, retries and backoff included
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 60;

/// Default viewport, matching a common laptop display
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1366;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 768;

/// Default artifact root, relative to the working directory
pub const DEFAULT_SCREENSHOTS_DIR: &str = "screenshots";

/// Prefix of every run root directory name
pub const RUN_DIR_PREFIX: &str = "task_";

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Next update: 2025-04-29 (quarterly schedule)
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
