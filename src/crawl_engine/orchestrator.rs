//! Capture run orchestration
//!
//! Expands the entity × site matrix into tasks, then runs them in static
//! waves of `max_concurrent_tasks`: every task of a wave is spawned at once
//! and the next wave starts only when all of them are terminal. Each task
//! runs its retry cycle under one deadline; a deadline hit marks the shared
//! session as suspect and it is recycled before the next wave.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{error, info, warn};
use std::sync::Arc;

use super::attempt::search_and_capture;
use super::crawl_types::{
    CrawlError, CrawlResult, RegistryError, SiteDescriptor, TaskError, TaskId, TaskRecord,
};
use super::deadline::with_task_deadline;
use super::registry::TaskRegistry;
use super::retry::RetryPolicy;
use crate::automation::{AutomationDriver, SessionPool};
use crate::config::CaptureConfig;
use crate::content_saver::{create_run_dir, run_dir_name, sanitize_name};
use crate::crawl_events::ProgressPublisher;
use crate::utils::format_timestamp;

/// Everything a task needs, shared by all tasks of a run
pub struct RunContext<D: AutomationDriver> {
    pub config: Arc<CaptureConfig>,
    pub pool: Arc<SessionPool<D>>,
    pub registry: Arc<TaskRegistry>,
    pub publisher: Arc<ProgressPublisher>,
    /// Query time stamped on captures; the run's `as_of`, or the replay time
    pub queried_at: DateTime<Utc>,
}

impl<D: AutomationDriver> Clone for RunContext<D> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            pool: Arc::clone(&self.pool),
            registry: Arc::clone(&self.registry),
            publisher: Arc::clone(&self.publisher),
            queried_at: self.queried_at,
        }
    }
}

impl<D: AutomationDriver> RunContext<D> {
    /// Publish after a registry write, logging writes the state machine refused
    fn publish_after(&self, id: &TaskId, write: Result<(), RegistryError>) {
        match write {
            Ok(()) => {
                self.publisher.publish(&self.registry);
            }
            Err(e) => error!("[{id}] registry rejected update: {e}"),
        }
    }
}

/// How a task's attempt cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failed,
    /// Failed on the cycle deadline; the session should be recycled
    TimedOut,
}

/// Time-scoped run identifier, unique even for runs sharing `as_of`
#[must_use]
pub fn new_run_id(as_of: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", format_timestamp(as_of), &suffix[..8])
}

/// Validate the inputs and build the task list in entity-major order
pub fn expand_tasks(
    run_id: &str,
    entities: &[String],
    sites: &[SiteDescriptor],
) -> CrawlResult<Vec<TaskRecord>> {
    if entities.is_empty() {
        return Err(CrawlError::InvalidConfig("no entities to search".into()));
    }
    if sites.is_empty() {
        return Err(CrawlError::InvalidConfig("no sites to search".into()));
    }

    // Keyed by on-disk name: entities share a directory and sites share a
    // file-name prefix when their sanitized names match (case-insensitively)
    let mut seen_entities = AHashMap::with_capacity(entities.len());
    let mut names = Vec::with_capacity(entities.len());
    for raw in entities {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CrawlError::InvalidConfig("entity names must not be blank".into()));
        }
        if let Some(previous) = seen_entities.insert(storage_key(name), name.to_string()) {
            return Err(CrawlError::InvalidConfig(if previous == name {
                format!("duplicate entity '{name}'")
            } else {
                format!("entities '{previous}' and '{name}' would share a directory")
            }));
        }
        names.push(name.to_string());
    }

    let mut seen_sites = AHashMap::with_capacity(sites.len());
    let mut descriptors = Vec::with_capacity(sites.len());
    for site in sites {
        site.validate().map_err(CrawlError::InvalidConfig)?;
        if let Some(previous) = seen_sites.insert(storage_key(&site.name), site.name.clone()) {
            return Err(CrawlError::InvalidConfig(if previous == site.name {
                format!("duplicate site '{}'", site.name)
            } else {
                format!("sites '{previous}' and '{}' would share screenshot names", site.name)
            }));
        }
        descriptors.push(Arc::new(site.clone()));
    }

    let tasks = names
        .iter()
        .flat_map(|entity| {
            descriptors.iter().map(move |site| {
                TaskRecord::new(
                    TaskId::new(run_id, entity, &site.name),
                    entity.as_str(),
                    Arc::clone(site),
                )
            })
        })
        .collect();
    Ok(tasks)
}

fn storage_key(name: &str) -> String {
    sanitize_name(name).to_lowercase()
}

/// Execute one full run and return its registry
///
/// The session is acquired before any directory is touched and released on
/// every path once it was acquired.
pub async fn run_capture<D: AutomationDriver>(
    config: Arc<CaptureConfig>,
    pool: Arc<SessionPool<D>>,
    publisher: Arc<ProgressPublisher>,
    entities: &[String],
    sites: &[SiteDescriptor],
    as_of: DateTime<Utc>,
) -> CrawlResult<Arc<TaskRegistry>> {
    let run_id = new_run_id(as_of);
    let tasks = expand_tasks(&run_id, entities, sites)?;
    let planned_root = config.storage_dir().join(run_dir_name(as_of));
    let registry = TaskRegistry::new(run_id.clone(), planned_root, as_of, tasks)
        .map_err(|e| CrawlError::InvalidConfig(e.to_string()))?;

    info!(
        "Run {run_id}: {} entities x {} sites = {} tasks, waves of {}",
        entities.len(),
        sites.len(),
        registry.len(),
        config.max_concurrent_tasks()
    );

    pool.acquire()
        .await
        .map_err(|e| CrawlError::RunAborted(e.to_string()))?;

    let root = match create_run_dir(config.storage_dir(), as_of).await {
        Ok(root) => root,
        Err(e) => {
            error!("Run {run_id}: could not create run directory: {e}");
            pool.release().await;
            return Err(e.into());
        }
    };

    let registry = Arc::new(registry);
    publisher.publish(&registry);

    let ctx = RunContext {
        config,
        pool: Arc::clone(&pool),
        registry: Arc::clone(&registry),
        publisher,
        queried_at: as_of,
    };
    dispatch_waves(&ctx, &registry.ids()).await;
    pool.release().await;

    let counts = registry.counts();
    info!(
        "Run {run_id} finished: {} succeeded, {} failed, artifacts in {}",
        counts.success,
        counts.failed,
        root.display()
    );
    Ok(registry)
}

/// Run `ids` in static waves against the context's session
pub async fn dispatch_waves<D: AutomationDriver>(ctx: &RunContext<D>, ids: &[TaskId]) {
    let wave_size = ctx.config.max_concurrent_tasks().max(1);
    let wave_count = ids.len().div_ceil(wave_size);

    for (index, wave) in ids.chunks(wave_size).enumerate() {
        // Reuses the live session after a health check, or replaces a dead one
        if let Err(e) = ctx.pool.acquire().await {
            warn!("Session unavailable before wave {}: {e}", index + 1);
        }

        info!("Wave {}/{wave_count}: {} task(s)", index + 1, wave.len());
        let handles: Vec<_> = wave
            .iter()
            .map(|id| {
                let ctx = ctx.clone();
                let id = id.clone();
                tokio::spawn(async move { run_task(&ctx, &id).await })
            })
            .collect();

        let mut timed_out = false;
        for (id, joined) in wave.iter().zip(join_all(handles).await) {
            match joined {
                Ok(TaskOutcome::TimedOut) => timed_out = true,
                Ok(_) => {}
                Err(e) => {
                    error!("[{id}] task aborted: {e}");
                    let aborted = ctx.registry.mark_aborted(id, &format!("task aborted: {e}"));
                    ctx.publish_after(id, aborted);
                }
            }
        }

        if timed_out && index + 1 < wave_count {
            warn!("Wave {} hit the task deadline, recycling the session", index + 1);
            if let Err(e) = ctx.pool.recycle().await {
                error!("Session recycle failed: {e}");
            }
        }
    }
}

/// One task's attempt cycle under the run deadline
async fn run_task<D: AutomationDriver>(ctx: &RunContext<D>, id: &TaskId) -> TaskOutcome {
    let Some(task) = ctx.registry.get(id) else {
        error!("[{id}] not in registry");
        return TaskOutcome::Failed;
    };
    let task = &task;
    let policy = RetryPolicy::from(*ctx.config.retry());

    let cycle = policy.run(
        move |attempt| async move {
            ctx.publish_after(id, ctx.registry.begin_attempt(id, attempt));
            search_and_capture(
                &ctx.pool,
                &ctx.config,
                ctx.registry.root_dir(),
                ctx.queried_at,
                task,
            )
            .await
        },
        TaskError::is_retryable,
        |e, attempt| {
            warn!("[{id}] attempt {attempt} failed: {e}");
            ctx.publish_after(id, ctx.registry.mark_retrying(id, &e.to_string()));
        },
    );

    match with_task_deadline(cycle, ctx.config.task_timeout(), id).await {
        Ok(path) => {
            info!("[{id}] captured {}", path.display());
            ctx.publish_after(id, ctx.registry.mark_success(id, path));
            TaskOutcome::Success
        }
        Err(e) => {
            error!("[{id}] failed: {e}");
            ctx.publish_after(id, ctx.registry.mark_failed(id, &e.to_string()));
            if matches!(e, TaskError::ResourceTimeout { .. }) {
                TaskOutcome::TimedOut
            } else {
                TaskOutcome::Failed
            }
        }
    }
}
