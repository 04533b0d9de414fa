//! Control surface for capture runs
//!
//! `CaptureService` owns the session pool and the publisher for its whole
//! lifetime and remembers the most recent run, which is what `retry_tasks`,
//! `progress` and `current_run_dir` operate on. Runs and retries are
//! serialized: a second call waits for the first to finish.

use ahash::AHashSet;
use chrono::{DateTime, Utc};
use log::info;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;

use super::crawl_types::{CrawlError, CrawlResult, SiteDescriptor, TaskId, TaskStatus};
use super::orchestrator::{RunContext, dispatch_waves, run_capture};
use super::registry::TaskRegistry;
use crate::automation::{AutomationDriver, SessionPool, SessionState};
use crate::config::CaptureConfig;
use crate::crawl_events::{ProgressPublisher, ProgressSnapshot};

pub struct CaptureService<D: AutomationDriver> {
    config: Arc<CaptureConfig>,
    pool: Arc<SessionPool<D>>,
    publisher: Arc<ProgressPublisher>,
    current: Mutex<Option<Arc<TaskRegistry>>>,
    busy: tokio::sync::Mutex<()>,
}

impl<D: AutomationDriver> CaptureService<D> {
    #[must_use]
    pub fn new(config: CaptureConfig, driver: Arc<D>, publisher: Arc<ProgressPublisher>) -> Self {
        Self {
            config: Arc::new(config),
            pool: Arc::new(SessionPool::new(driver)),
            publisher,
            current: Mutex::new(None),
            busy: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    #[must_use]
    pub fn publisher(&self) -> &Arc<ProgressPublisher> {
        &self.publisher
    }

    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.pool.state()
    }

    /// Search every entity on every site and capture the results
    ///
    /// Returns the run root directory. Fails only on invalid input, an
    /// unlaunchable session or an uncreatable run directory; individual
    /// task failures are recorded on the tasks.
    pub async fn start_run(
        &self,
        entities: &[String],
        sites: &[SiteDescriptor],
        as_of: DateTime<Utc>,
    ) -> CrawlResult<PathBuf> {
        let _busy = self.busy.lock().await;
        let registry = run_capture(
            Arc::clone(&self.config),
            Arc::clone(&self.pool),
            Arc::clone(&self.publisher),
            entities,
            sites,
            as_of,
        )
        .await?;
        let root = registry.root_dir().to_path_buf();
        *self.current.lock() = Some(registry);
        Ok(root)
    }

    /// Re-queue and replay failed tasks of the current run
    ///
    /// Ids that are unknown or not `failed` are ignored; when none qualify
    /// nothing happens and no snapshot is published. Replayed captures are
    /// stamped with the time of the retry, not the run's `as_of`.
    pub async fn retry_tasks(&self, ids: &[TaskId]) -> CrawlResult<()> {
        let _busy = self.busy.lock().await;
        let Some(registry) = self.current.lock().clone() else {
            return Ok(());
        };

        let mut seen = AHashSet::with_capacity(ids.len());
        let eligible: Vec<TaskId> = ids
            .iter()
            .filter(|id| seen.insert((*id).clone()))
            .filter(|id| {
                registry
                    .get(id)
                    .is_some_and(|task| task.status == TaskStatus::Failed)
            })
            .cloned()
            .collect();
        if eligible.is_empty() {
            return Ok(());
        }

        self.pool
            .acquire()
            .await
            .map_err(|e| CrawlError::RunAborted(e.to_string()))?;

        let mut requeued = Vec::with_capacity(eligible.len());
        for id in eligible {
            if matches!(registry.requeue_failed(&id), Ok(true)) {
                self.publisher.publish(&registry);
                requeued.push(id);
            }
        }
        info!("Retrying {} failed task(s) of run {}", requeued.len(), registry.run_id());

        let ctx = RunContext {
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            registry,
            publisher: Arc::clone(&self.publisher),
            queried_at: Utc::now(),
        };
        dispatch_waves(&ctx, &requeued).await;
        self.pool.release().await;
        Ok(())
    }

    /// Fresh snapshot of the current run, without publishing it
    #[must_use]
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.current
            .lock()
            .as_ref()
            .map(|registry| self.publisher.peek(registry))
    }

    /// Root directory of the current run
    #[must_use]
    pub fn current_run_dir(&self) -> Option<PathBuf> {
        self.current
            .lock()
            .as_ref()
            .map(|registry| registry.root_dir().to_path_buf())
    }

    /// Ids of the current run's failed tasks, in matrix order
    #[must_use]
    pub fn failed_task_ids(&self) -> Vec<TaskId> {
        self.current
            .lock()
            .as_ref()
            .map(|registry| {
                registry
                    .records()
                    .into_iter()
                    .filter(|t| t.status == TaskStatus::Failed)
                    .map(|t| t.id)
                    .collect()
            })
            .unwrap_or_default()
    }
}
