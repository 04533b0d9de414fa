//! Progress snapshot type
//!
//! A snapshot is a read-only view of the task registry taken right after a
//! status write. It is never mutated after publication.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::crawl_engine::registry::TaskRegistry;
use crate::crawl_engine::crawl_types::{TaskRecord, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    /// Publication order; strictly increasing per publisher
    pub sequence: u64,
    pub run_id: String,
    pub run_dir: PathBuf,
    pub total: usize,
    /// Tasks in `success`
    pub completed: usize,
    /// Tasks in `failed`
    pub failed: usize,
    /// Every task, in matrix order
    pub tasks: Vec<TaskRecord>,
    /// First task currently in `processing`, if any
    pub current_task: Option<TaskRecord>,
    pub published_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Build a snapshot from the registry's current state
    #[must_use]
    pub fn capture(registry: &TaskRegistry, sequence: u64) -> Self {
        let tasks = registry.records();
        let completed = count(&tasks, TaskStatus::Success);
        let failed = count(&tasks, TaskStatus::Failed);
        let current_task = tasks
            .iter()
            .find(|t| t.status == TaskStatus::Processing)
            .cloned();

        Self {
            sequence,
            run_id: registry.run_id().to_string(),
            run_dir: registry.root_dir().to_path_buf(),
            total: tasks.len(),
            completed,
            failed,
            tasks,
            current_task,
            published_at: Utc::now(),
        }
    }

    /// Tasks that are pending, processing or retrying
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.total - self.completed - self.failed
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.in_flight() == 0
    }

    #[must_use]
    pub fn count(&self, status: TaskStatus) -> usize {
        count(&self.tasks, status)
    }
}

fn count(tasks: &[TaskRecord], status: TaskStatus) -> usize {
    tasks.iter().filter(|t| t.status == status).count()
}
