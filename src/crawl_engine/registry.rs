//! Task registry for one run
//!
//! Records live in insertion order, each behind its own lock, so writes to
//! different tasks never contend and writes to one task are serialized. Every
//! mutation validates the status transition before applying it.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

use super::crawl_types::{RegistryError, TaskId, TaskRecord, TaskStatus};

/// Counts derived from the registry at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub retrying: usize,
    pub success: usize,
    pub failed: usize,
}

pub struct TaskRegistry {
    run_id: String,
    root_dir: PathBuf,
    as_of: DateTime<Utc>,
    index: AHashMap<TaskId, usize>,
    records: Vec<Mutex<TaskRecord>>,
}

impl TaskRegistry {
    /// Build a registry; task ids must be unique
    pub fn new(
        run_id: impl Into<String>,
        root_dir: impl Into<PathBuf>,
        as_of: DateTime<Utc>,
        tasks: Vec<TaskRecord>,
    ) -> Result<Self, RegistryError> {
        let mut index = AHashMap::with_capacity(tasks.len());
        for (position, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), position).is_some() {
                return Err(RegistryError::DuplicateTask(task.id.clone()));
            }
        }
        Ok(Self {
            run_id: run_id.into(),
            root_dir: root_dir.into(),
            as_of,
            index,
            records: tasks.into_iter().map(Mutex::new).collect(),
        })
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    #[must_use]
    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Task ids in matrix order
    #[must_use]
    pub fn ids(&self) -> Vec<TaskId> {
        self.records.iter().map(|r| r.lock().id.clone()).collect()
    }

    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.slot(id).ok().map(|slot| slot.lock().clone())
    }

    /// Copy of every record in matrix order
    #[must_use]
    pub fn records(&self) -> Vec<TaskRecord> {
        self.records.iter().map(|r| r.lock().clone()).collect()
    }

    #[must_use]
    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts {
            total: self.records.len(),
            ..StatusCounts::default()
        };
        for record in &self.records {
            match record.lock().status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Retrying => counts.retrying += 1,
                TaskStatus::Success => counts.success += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Enter `Processing` for attempt number `attempt`
    pub fn begin_attempt(&self, id: &TaskId, attempt: u32) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Processing, |record| {
            record.attempts = attempt;
        })
    }

    /// Record a failed attempt that will be retried
    pub fn mark_retrying(&self, id: &TaskId, error: &str) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Retrying, |record| {
            record.last_error = Some(error.to_string());
        })
    }

    pub fn mark_success(&self, id: &TaskId, artifact: PathBuf) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Success, |record| {
            record.last_error = None;
            record.artifact_path = Some(artifact);
        })
    }

    pub fn mark_failed(&self, id: &TaskId, error: &str) -> Result<(), RegistryError> {
        self.transition(id, TaskStatus::Failed, |record| {
            record.last_error = Some(error.to_string());
        })
    }

    /// Fail a task whose attempt cycle died without recording an outcome
    ///
    /// Unlike `mark_failed` this also accepts `Pending`: a task can be lost
    /// before its first attempt began.
    pub fn mark_aborted(&self, id: &TaskId, error: &str) -> Result<(), RegistryError> {
        let slot = self.slot(id)?;
        let mut record = slot.lock();
        if record.status.is_terminal() {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to: TaskStatus::Failed,
            });
        }
        record.status = TaskStatus::Failed;
        record.last_error = Some(error.to_string());
        Ok(())
    }

    /// Put a failed task back to `Pending`, clearing its error and attempts
    ///
    /// Returns `Ok(false)` without touching the record when the task is not
    /// `Failed`.
    pub fn requeue_failed(&self, id: &TaskId) -> Result<bool, RegistryError> {
        let slot = self.slot(id)?;
        let mut record = slot.lock();
        if record.status != TaskStatus::Failed {
            return Ok(false);
        }
        record.status = TaskStatus::Pending;
        record.attempts = 0;
        record.last_error = None;
        record.artifact_path = None;
        Ok(true)
    }

    fn transition<F>(&self, id: &TaskId, to: TaskStatus, apply: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&mut TaskRecord),
    {
        let slot = self.slot(id)?;
        let mut record = slot.lock();
        if !record.status.can_transition_to(to) {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to,
            });
        }
        record.status = to;
        apply(&mut record);
        Ok(())
    }

    fn slot(&self, id: &TaskId) -> Result<&Mutex<TaskRecord>, RegistryError> {
        self.index
            .get(id)
            .map(|&position| &self.records[position])
            .ok_or_else(|| RegistryError::UnknownTask(id.clone()))
    }
}
