//! Bulk entity lookup with browser-driven screenshot capture.
//!
//! A run searches every entity on every configured site, one browser tab per
//! (entity, site) task, and stores a full-page screenshot of each result page
//! under a per-run directory. Tasks run in fixed-size waves against one shared
//! browser session, retry with exponential backoff under a per-task deadline,
//! and report progress after every status change.
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use kodegen_tools_sitecapture::{
//!     CaptureConfig, CaptureService, ChromiumDriver, ProgressPublisher, SiteDescriptor,
//! };
//!
//! let config = CaptureConfig::builder().storage_dir("./screenshots").build()?;
//! let publisher = Arc::new(ProgressPublisher::new());
//! publisher.subscribe_fn(|s: &kodegen_tools_sitecapture::ProgressSnapshot| {
//!     println!("{}/{} done", s.completed + s.failed, s.total);
//! });
//!
//! let driver = Arc::new(ChromiumDriver::new(&config));
//! let service = CaptureService::new(config, driver, publisher);
//! let sites: Vec<SiteDescriptor> = serde_json::from_str(&std::fs::read_to_string("sites.json")?)?;
//! let run_dir = service
//!     .start_run(&["Acme Corp".to_string()], &sites, chrono::Utc::now())
//!     .await?;
//! println!("screenshots in {}", run_dir.display());
//! # Ok(())
//! # }
//! ```

pub mod automation;
pub mod browser_profile;
pub mod browser_setup;
pub mod config;
pub mod content_saver;
pub mod crawl_engine;
pub mod crawl_events;
pub mod utils;

pub use automation::{
    AutomationDriver, ChromiumDriver, DriverError, PageGuard, SessionPool, SessionState, Watermark,
};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use config::{CaptureConfig, HumanizeConfig, RetryConfig};
pub use content_saver::{StorageError, create_entity_dir, create_run_dir};
pub use crawl_engine::{
    CaptureService, CrawlError, CrawlResult, RetryPolicy, SiteDescriptor, TaskError, TaskId,
    TaskRecord, TaskRegistry, TaskStatus,
};
pub use crawl_events::{ProgressPublisher, ProgressSnapshot, ProgressSubscriber};
