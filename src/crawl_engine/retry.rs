//! Retry policy with capped exponential backoff
//!
//! The delay before attempt `k + 1` (`k` being the attempt that just failed)
//! is `min(initial_delay * backoff_factor^(k-1), max_delay)`. No jitter: the
//! schedule is deterministic so runs are reproducible.

use log::warn;
use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            backoff_factor: config.backoff_factor,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after attempt `failed_attempt` (1-based) failed
    #[must_use]
    pub fn delay_for(&self, failed_attempt: u32) -> Duration {
        let exponent = i32::try_from(failed_attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled.max(0.0))
        }
    }

    /// Run `operation` until it succeeds, the attempts run out, or
    /// `should_retry` rejects an error
    ///
    /// `operation` receives the 1-based attempt number. `on_retry` runs
    /// before every backoff delay with the error and the attempt that failed.
    /// The error of the last attempt is returned as-is.
    pub async fn run<T, E, Op, Fut, S, R>(
        &self,
        mut operation: Op,
        should_retry: S,
        mut on_retry: R,
    ) -> Result<T, E>
    where
        Op: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: Fn(&E) -> bool,
        R: FnMut(&E, u32),
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt >= self.max_attempts || !should_retry(&e) {
                        return Err(e);
                    }
                    on_retry(&e, attempt);
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Attempt {}/{} failed, retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
