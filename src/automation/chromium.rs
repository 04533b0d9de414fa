//! chromiumoxide implementation of [`AutomationDriver`]
//!
//! One `ChromiumSession` is one Chrome process with its own profile. Pages
//! are plain tabs with the run's viewport applied. Typing is paced with
//! random delays and always verified by reading the field value back.

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, CaptureScreenshotParams};
use rand::Rng;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cleanup::{CleanupResult, cleanup_browser_and_data};
use super::{AutomationDriver, DriverError, Watermark};
use crate::browser_profile::{BrowserProfile, create_unique_profile};
use crate::browser_setup::{LaunchOptions, apply_stealth_measures, launch_browser};
use crate::config::{CaptureConfig, HumanizeConfig};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A running browser plus its CDP handler task and profile directory
pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    profile: BrowserProfile,
}

impl ChromiumSession {
    pub fn browser(&self) -> &Browser {
        &self.browser
    }
}

#[derive(Debug, Deserialize)]
struct FieldValue {
    found: bool,
    value: String,
}

/// Settings the driver reads from [`CaptureConfig`]
#[derive(Debug, Clone)]
struct DriverSettings {
    headless: bool,
    viewport: (u32, u32),
    user_agent: String,
    chrome_data_dir: Option<PathBuf>,
    navigation_timeout: Duration,
    results_timeout: Duration,
    results_navigation_timeout: Duration,
    max_typing_rounds: u32,
    humanize: HumanizeConfig,
}

pub struct ChromiumDriver {
    settings: DriverSettings,
}

impl ChromiumDriver {
    #[must_use]
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            settings: DriverSettings {
                headless: config.headless(),
                viewport: config.viewport(),
                user_agent: config.user_agent().to_string(),
                chrome_data_dir: config.chrome_data_dir().cloned(),
                navigation_timeout: config.navigation_timeout(),
                results_timeout: config.results_timeout(false),
                results_navigation_timeout: config.results_timeout(true),
                max_typing_rounds: config.max_typing_rounds(),
                humanize: *config.humanize(),
            },
        }
    }

    async fn read_field(page: &Page, locator: &str) -> Result<String, DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? {{ found: true, value: String(el.value ?? '') }} : {{ found: false, value: '' }}; }})()",
            sel = js_string(locator)
        );
        let field = page
            .evaluate(script.as_str())
            .await
            .map_err(|e| field_error(locator, format!("could not read field: {e}")))?
            .into_value::<FieldValue>()
            .map_err(|e| field_error(locator, format!("unexpected field value: {e}")))?;
        if field.found {
            Ok(field.value)
        } else {
            Err(field_error(locator, "field disappeared from the page"))
        }
    }

    /// Empty the field, retrying a few times for inputs that restore content
    async fn clear_field(&self, page: &Page, locator: &str) -> Result<(), DriverError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
             el.focus(); el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); return true; }})()",
            sel = js_string(locator)
        );
        for _ in 0..self.settings.max_typing_rounds {
            page.evaluate(script.as_str())
                .await
                .map_err(|e| field_error(locator, format!("could not clear field: {e}")))?;
            pause(self.settings.humanize.clear_delay_ms).await;
            if Self::read_field(page, locator).await?.is_empty() {
                return Ok(());
            }
        }
        Err(field_error(locator, "field could not be emptied"))
    }

    async fn type_slowly(&self, page: &Page, locator: &str, text: &str) -> Result<(), DriverError> {
        let element = page
            .find_element(locator)
            .await
            .map_err(|e| field_error(locator, format!("field not found: {e}")))?;
        element
            .click()
            .await
            .map_err(|e| field_error(locator, format!("could not focus field: {e}")))?;

        let mut buf = [0u8; 4];
        for ch in text.chars() {
            element
                .type_str(ch.encode_utf8(&mut buf))
                .await
                .map_err(|e| field_error(locator, format!("typing failed: {e}")))?;
            pause(self.settings.humanize.keystroke_delay_ms).await;
        }
        Ok(())
    }

    async fn poll_for(page: &Page, locator: &str, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if page.find_element(locator).await.is_ok() {
                debug!("'{}' appeared after {:?}", locator, start.elapsed());
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    type Session = ChromiumSession;
    type Page = Page;

    async fn open_session(&self) -> Result<ChromiumSession, DriverError> {
        let profile = match &self.settings.chrome_data_dir {
            Some(dir) => BrowserProfile::pinned(dir.clone()),
            None => create_unique_profile(),
        }
        .map_err(|e| DriverError::Session(format!("{e:#}")))?;

        let options = LaunchOptions {
            headless: self.settings.headless,
            viewport: self.settings.viewport,
            user_agent: self.settings.user_agent.clone(),
            user_data_dir: profile.path().to_path_buf(),
            request_timeout: CDP_REQUEST_TIMEOUT,
        };
        let (browser, handler) = launch_browser(&options)
            .await
            .map_err(|e| DriverError::Session(format!("{e:#}")))?;

        info!("Browser session started with profile {}", profile.path().display());
        Ok(ChromiumSession {
            browser,
            handler,
            profile,
        })
    }

    async fn close_session(&self, session: ChromiumSession) {
        let ChromiumSession {
            browser,
            handler,
            profile,
        } = session;
        if let CleanupResult::PartialFailure(errors) = cleanup_browser_and_data(browser, profile).await {
            warn!("Browser cleanup incomplete: {}", errors.join("; "));
        }
        handler.abort();
    }

    async fn is_alive(&self, session: &ChromiumSession) -> bool {
        session.browser.version().await.is_ok()
    }

    async fn open_page(&self, session: &ChromiumSession) -> Result<Page, DriverError> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Session(format!("could not open page: {e}")))?;

        let (width, height) = self.settings.viewport;
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(width))
            .height(i64::from(height))
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| DriverError::Session(format!("invalid viewport: {e}")))?;
        if let Err(e) = page.execute(metrics).await {
            warn!("Failed to apply viewport {}x{}: {}", width, height, e);
        }
        if let Err(e) = apply_stealth_measures(&page, &self.settings.user_agent).await {
            warn!("Stealth injection failed: {:#}", e);
        }
        Ok(page)
    }

    async fn close_page(&self, page: Page) {
        if let Err(e) = page.close().await {
            debug!("Page close failed: {}", e);
        }
    }

    async fn navigate(&self, page: &Page, url: &str) -> Result<(), DriverError> {
        let timeout = self.settings.navigation_timeout;
        let nav = async {
            page.goto(url).await?;
            page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, nav).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(DriverError::Navigation {
                url: url.to_string(),
                message: format!("timeout after {} seconds", timeout.as_secs()),
            }),
        }
    }

    async fn wait_for_element(
        &self,
        page: &Page,
        locator: &str,
        timeout: Duration,
    ) -> Result<(), DriverError> {
        if Self::poll_for(page, locator, timeout).await {
            Ok(())
        } else {
            Err(field_error(
                locator,
                format!("not present after {} seconds", timeout.as_secs()),
            ))
        }
    }

    async fn type_into_field(&self, page: &Page, locator: &str, text: &str) -> Result<(), DriverError> {
        let rounds = self.settings.max_typing_rounds;
        for round in 1..=rounds {
            self.clear_field(page, locator).await?;
            self.type_slowly(page, locator, text).await?;

            let actual = Self::read_field(page, locator).await?;
            if actual == text {
                debug!("Field '{}' verified after {} round(s)", locator, round);
                return Ok(());
            }
            warn!(
                "Field '{}' holds {:?} instead of {:?} (round {}/{})",
                locator, actual, text, round, rounds
            );
            pause(self.settings.humanize.mistype_delay_ms).await;
        }
        Err(field_error(
            locator,
            format!("value never matched after {rounds} rounds"),
        ))
    }

    async fn click_and_await_results(
        &self,
        page: &Page,
        trigger: &str,
        results: &str,
        navigation_expected: bool,
    ) -> Result<(), DriverError> {
        let button = page.find_element(trigger).await.map_err(|e| DriverError::Interaction {
            locator: trigger.to_string(),
            message: format!("trigger not found: {e}"),
        })?;
        button.click().await.map_err(|e| DriverError::Interaction {
            locator: trigger.to_string(),
            message: format!("click failed: {e}"),
        })?;

        let results_timeout = if navigation_expected {
            // Some sites render in place even when flagged; a missed navigation is fine
            match tokio::time::timeout(self.settings.navigation_timeout, page.wait_for_navigation()).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => debug!("Navigation after search failed: {}", e),
                Err(_) => debug!("Navigation after search did not finish in time"),
            }
            self.settings.results_navigation_timeout
        } else {
            self.settings.results_timeout
        };

        if !Self::poll_for(page, results, results_timeout).await {
            warn!(
                "Results area '{}' not found within {} seconds, capturing anyway",
                results,
                results_timeout.as_secs()
            );
        }
        Ok(())
    }

    async fn annotate(&self, page: &Page, watermark: &Watermark) -> Result<(), DriverError> {
        let script = format!(
            r"(() => {{
                const banner = document.createElement('div');
                banner.textContent = {text};
                banner.style.cssText = 'position:fixed;left:0;right:0;bottom:0;z-index:2147483647;' +
                    'padding:8px 12px;background:rgba(0,0,0,0.7);color:#fff;' +
                    'font:14px/1.4 sans-serif;text-align:center;pointer-events:none;';
                document.body.appendChild(banner);
                return true;
            }})()",
            text = js_string(&watermark.text())
        );
        page.evaluate(script.as_str())
            .await
            .map_err(|e| DriverError::Capture(format!("could not add watermark: {e}")))?;
        pause(self.settings.humanize.settle_delay_ms).await;
        Ok(())
    }

    async fn capture_full_page(&self, page: &Page) -> Result<Vec<u8>, DriverError> {
        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            capture_beyond_viewport: Some(true),
            ..Default::default()
        };
        page.screenshot(params)
            .await
            .map_err(|e| DriverError::Capture(e.to_string()))
    }
}

fn field_error(locator: &str, message: impl Into<String>) -> DriverError {
    DriverError::Field {
        locator: locator.to_string(),
        message: message.into(),
    }
}

/// Quote a value as a JavaScript string literal
fn js_string(value: &str) -> String {
    // JSON strings are valid JS string literals
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Sleep for a random duration within an inclusive millisecond range
async fn pause((min, max): (u64, u64)) {
    if max == 0 {
        return;
    }
    let ms = if min >= max {
        min
    } else {
        rand::rng().random_range(min..=max)
    };
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
