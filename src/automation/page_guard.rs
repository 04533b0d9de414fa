//! Per-task page ownership
//!
//! A task owns its page for exactly as long as the guard lives. The normal
//! path closes it with [`PageGuard::close`]; any other exit (an error, a
//! panic, the attempt future being dropped by the task deadline) closes it
//! from `Drop` on a spawned task.

use std::sync::Arc;
use tracing::{debug, warn};

use super::AutomationDriver;

pub struct PageGuard<D: AutomationDriver> {
    driver: Arc<D>,
    page: Option<D::Page>,
}

impl<D: AutomationDriver> PageGuard<D> {
    pub fn new(driver: Arc<D>, page: D::Page) -> Self {
        Self {
            driver,
            page: Some(page),
        }
    }

    /// Borrow the page
    ///
    /// The page is only taken out by `close`/`Drop`, both of which consume
    /// the guard, so it is always present here.
    pub fn page(&self) -> &D::Page {
        match &self.page {
            Some(page) => page,
            None => unreachable!("page is only taken when the guard is consumed"),
        }
    }

    /// Close the page and wait for the driver to finish
    pub async fn close(mut self) {
        if let Some(page) = self.page.take() {
            self.driver.close_page(page).await;
        }
    }
}

impl<D: AutomationDriver> Drop for PageGuard<D> {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Page dropped without close, closing in background");
                let driver = Arc::clone(&self.driver);
                handle.spawn(async move {
                    driver.close_page(page).await;
                });
            }
            Err(_) => warn!("Page dropped outside a tokio runtime, it is leaked"),
        }
    }
}
