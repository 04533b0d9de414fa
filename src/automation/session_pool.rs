//! Run-scoped owner of the shared automation session
//!
//! Lazily opens one session, hands out pages against it, and is the only
//! place that closes or replaces it. Pages are opened under a read lock,
//! recycling and release take the write lock, so no task can obtain a page
//! while the session is being swapped out.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{AutomationDriver, DriverError, PageGuard};

/// Observable lifecycle of the shared session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    /// Live session; `generation` grows by one every time a session is opened
    Live { generation: u64 },
    Recycling,
}

pub struct SessionPool<D: AutomationDriver> {
    driver: Arc<D>,
    slot: RwLock<Option<D::Session>>,
    state: Mutex<SessionState>,
    generation: Mutex<u64>,
}

impl<D: AutomationDriver> SessionPool<D> {
    /// Create a pool. No session is opened until `acquire()`.
    #[must_use]
    pub fn new(driver: Arc<D>) -> Self {
        Self {
            driver,
            slot: RwLock::new(None),
            state: Mutex::new(SessionState::Closed),
            generation: Mutex::new(0),
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Open the session unless one is already live
    ///
    /// A live session that fails the driver's liveness probe is closed and
    /// replaced, the same recovery a wedged browser gets after a timeout.
    pub async fn acquire(&self) -> Result<u64, DriverError> {
        let mut slot = self.slot.write().await;

        if let Some(session) = slot.as_ref() {
            if self.driver.is_alive(session).await {
                debug!("Session health check passed, reusing live session");
                return Ok(self.current_generation());
            }
            warn!("Session health check failed, replacing it");
            if let Some(dead) = slot.take() {
                self.driver.close_session(dead).await;
            }
        }

        self.open_into(&mut slot).await
    }

    /// Close the live session and open a fresh one
    pub async fn recycle(&self) -> Result<u64, DriverError> {
        let mut slot = self.slot.write().await;
        *self.state.lock() = SessionState::Recycling;
        info!("Recycling automation session");

        if let Some(session) = slot.take() {
            self.driver.close_session(session).await;
        }

        self.open_into(&mut slot).await
    }

    /// Close the session if one is open. Calling it twice is harmless.
    pub async fn release(&self) {
        let mut slot = self.slot.write().await;
        if let Some(session) = slot.take() {
            info!("Releasing automation session");
            self.driver.close_session(session).await;
        }
        *self.state.lock() = SessionState::Closed;
    }

    /// Open an isolated page against the live session
    pub async fn open_page(&self) -> Result<PageGuard<D>, DriverError> {
        let slot = self.slot.read().await;
        let session = slot
            .as_ref()
            .ok_or_else(|| DriverError::Session("no live session".to_string()))?;
        let page = self.driver.open_page(session).await?;
        Ok(PageGuard::new(Arc::clone(&self.driver), page))
    }

    async fn open_into(&self, slot: &mut Option<D::Session>) -> Result<u64, DriverError> {
        match self.driver.open_session().await {
            Ok(session) => {
                *slot = Some(session);
                let generation = {
                    let mut counter = self.generation.lock();
                    *counter += 1;
                    *counter
                };
                *self.state.lock() = SessionState::Live { generation };
                info!(generation, "Automation session live");
                Ok(generation)
            }
            Err(e) => {
                *self.state.lock() = SessionState::Closed;
                error!("Failed to open automation session: {}", e);
                Err(e)
            }
        }
    }

    fn current_generation(&self) -> u64 {
        *self.generation.lock()
    }
}
