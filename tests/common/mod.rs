//! Scripted automation driver shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use kodegen_tools_sitecapture::{
    AutomationDriver, CaptureConfig, DriverError, RetryConfig, SiteDescriptor, Watermark,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Smallest valid PNG signature; the orchestrator never decodes it
pub const FAKE_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// What goes wrong for one (entity, site) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// The first `n` searches fail with a navigation error
    NavigationFailures(u32),
    /// The search field never accepts the text
    FieldMissing,
    /// The search never returns
    Hang,
    /// The search takes this long on top of the shared search delay
    Slow(Duration),
    /// The driver panics mid-search
    Panic,
}

pub struct MockSession {
    pub generation: u64,
}

pub struct MockPage {
    url: Mutex<Option<String>>,
    entity: Mutex<Option<String>>,
}

#[derive(Default)]
pub struct ScriptedDriver {
    faults: Mutex<HashMap<(String, String), Fault>>,
    searches: Mutex<HashMap<(String, String), u32>>,
    search_delay: Mutex<Duration>,
    fail_sessions: AtomicBool,
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    open_pages: AtomicUsize,
    peak_pages: AtomicUsize,
    watermarks: Mutex<Vec<String>>,
}

impl ScriptedDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fault(&self, entity: &str, site: &SiteDescriptor, fault: Fault) {
        self.faults
            .lock()
            .insert((entity.to_string(), site.home_url.clone()), fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Every search takes this long before results show up
    pub fn set_search_delay(&self, delay: Duration) {
        *self.search_delay.lock() = delay;
    }

    pub fn fail_sessions(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn sessions_opened(&self) -> u64 {
        self.sessions_opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u64 {
        self.sessions_closed.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.open_pages.load(Ordering::SeqCst)
    }

    pub fn peak_pages(&self) -> usize {
        self.peak_pages.load(Ordering::SeqCst)
    }

    pub fn watermarks(&self) -> Vec<String> {
        self.watermarks.lock().clone()
    }

    fn key(page: &MockPage) -> (String, String) {
        (
            page.entity.lock().clone().unwrap_or_default(),
            page.url.lock().clone().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl AutomationDriver for ScriptedDriver {
    type Session = MockSession;
    type Page = MockPage;

    async fn open_session(&self) -> Result<MockSession, DriverError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(DriverError::Session("browser binary not found".into()));
        }
        let generation = self.sessions_opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(MockSession { generation })
    }

    async fn close_session(&self, _session: MockSession) {
        self.sessions_closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn open_page(&self, _session: &MockSession) -> Result<MockPage, DriverError> {
        let now = self.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_pages.fetch_max(now, Ordering::SeqCst);
        Ok(MockPage {
            url: Mutex::new(None),
            entity: Mutex::new(None),
        })
    }

    async fn close_page(&self, _page: MockPage) {
        self.open_pages.fetch_sub(1, Ordering::SeqCst);
    }

    async fn navigate(&self, page: &MockPage, url: &str) -> Result<(), DriverError> {
        *page.url.lock() = Some(url.to_string());
        Ok(())
    }

    async fn wait_for_element(
        &self,
        _page: &MockPage,
        _locator: &str,
        _timeout: Duration,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn type_into_field(
        &self,
        page: &MockPage,
        locator: &str,
        text: &str,
    ) -> Result<(), DriverError> {
        *page.entity.lock() = Some(text.to_string());
        if self.faults.lock().get(&Self::key(page)) == Some(&Fault::FieldMissing) {
            return Err(DriverError::Field {
                locator: locator.to_string(),
                message: "element not found".into(),
            });
        }
        Ok(())
    }

    async fn click_and_await_results(
        &self,
        page: &MockPage,
        _trigger: &str,
        _results: &str,
        _navigation_expected: bool,
    ) -> Result<(), DriverError> {
        let key = Self::key(page);
        let search = {
            let mut searches = self.searches.lock();
            let count = searches.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        let fault = self.faults.lock().get(&key).copied();

        match fault {
            Some(Fault::Hang) => {
                std::future::pending::<()>().await;
            }
            Some(Fault::Slow(extra)) => tokio::time::sleep(extra).await,
            Some(Fault::Panic) => panic!("scripted driver crash"),
            Some(Fault::NavigationFailures(n)) if search <= n => {
                return Err(DriverError::Navigation {
                    url: key.1,
                    message: "net::ERR_CONNECTION_RESET".into(),
                });
            }
            _ => {}
        }

        let delay = *self.search_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn annotate(&self, _page: &MockPage, watermark: &Watermark) -> Result<(), DriverError> {
        self.watermarks.lock().push(watermark.text());
        Ok(())
    }

    async fn capture_full_page(&self, _page: &MockPage) -> Result<Vec<u8>, DriverError> {
        Ok(FAKE_PNG.to_vec())
    }
}

pub fn site(name: &str) -> SiteDescriptor {
    SiteDescriptor {
        name: name.to_string(),
        home_url: format!("https://{}.test/", name.to_lowercase()),
        search_input_selector: "input[name=q]".to_string(),
        search_button_selector: "button[type=submit]".to_string(),
        results_selector: "#results".to_string(),
        needs_navigation: false,
        needs_captcha: false,
    }
}

pub fn entities(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// Fast retries and a short deadline so failure paths finish quickly
pub fn test_config(storage: &Path, wave_size: usize) -> CaptureConfig {
    CaptureConfig::builder()
        .storage_dir(storage)
        .max_concurrent_tasks(wave_size)
        .retry(RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_factor: 2.0,
        })
        .task_timeout(Duration::from_secs(5))
        .build()
        .expect("valid test config")
}
