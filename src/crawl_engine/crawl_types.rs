//! Core types for capture runs
//!
//! Task identity, site descriptors, task records and the error taxonomy
//! shared by the orchestrator, the registry and the control surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::automation::DriverError;
use crate::content_saver::StorageError;

/// Deterministic task key: `{run_id}:{entity}@{site}`
///
/// Including the run id keeps the same (entity, site) pair from colliding
/// across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    #[must_use]
    pub fn new(run_id: &str, entity: &str, site: &str) -> Self {
        Self(format!("{run_id}:{entity}@{site}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for TaskId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A searchable site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteDescriptor {
    pub name: String,
    /// Entry URL, the page holding the search field
    pub home_url: String,
    pub search_input_selector: String,
    pub search_button_selector: String,
    pub results_selector: String,
    /// The search navigates to a new page instead of rendering in place
    #[serde(default)]
    pub needs_navigation: bool,
    /// An operator has to clear a challenge before the search field shows up
    #[serde(default)]
    pub needs_captcha: bool,
}

impl SiteDescriptor {
    /// Check the descriptor is usable, returning a readable reason otherwise
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("site name must not be blank".to_string());
        }
        let url = url::Url::parse(&self.home_url)
            .map_err(|e| format!("site '{}': invalid homeUrl '{}': {e}", self.name, self.home_url))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!(
                "site '{}': homeUrl must be http(s), got '{}'",
                self.name,
                url.scheme()
            ));
        }
        for (field, value) in [
            ("searchInputSelector", &self.search_input_selector),
            ("searchButtonSelector", &self.search_button_selector),
            ("resultsSelector", &self.results_selector),
        ] {
            if value.trim().is_empty() {
                return Err(format!("site '{}': {field} must not be blank", self.name));
            }
        }
        Ok(())
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Retrying,
    Success,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    /// Allowed edges of the task state machine
    ///
    /// `Retrying -> Failed` happens when the task deadline fires during a
    /// backoff delay; `Failed -> Pending` is the manual re-queue.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Success)
                | (Self::Processing, Self::Retrying)
                | (Self::Processing, Self::Failed)
                | (Self::Retrying, Self::Processing)
                | (Self::Retrying, Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Retrying => "retrying",
            Self::Success => "success",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One (entity, site) pairing within a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: TaskId,
    pub entity: String,
    pub site: Arc<SiteDescriptor>,
    pub status: TaskStatus,
    /// Attempts started in the current attempt cycle
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Set only on the transition into `Success`
    pub artifact_path: Option<PathBuf>,
}

impl TaskRecord {
    #[must_use]
    pub fn new(id: TaskId, entity: impl Into<String>, site: Arc<SiteDescriptor>) -> Self {
        Self {
            id,
            entity: entity.into(),
            site,
            status: TaskStatus::Pending,
            attempts: 0,
            last_error: None,
            artifact_path: None,
        }
    }
}

/// Run-level failures. Everything else is recorded on the task.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The automation session could not be started
    #[error("run aborted: {0}")]
    RunAborted(String),

    /// The run root directory could not be created
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Convenience alias for Result with `CrawlError`
pub type CrawlResult<T> = Result<T, CrawlError>;

/// Why a single task attempt (or attempt cycle) failed
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The whole attempt cycle overran its deadline
    #[error("task {task_id} timed out after {} seconds", after.as_secs())]
    ResourceTimeout { task_id: TaskId, after: Duration },
}

impl TaskError {
    /// Default retry predicate
    ///
    /// Navigation and capture failures are retried. Missing selectors, a
    /// dead session, storage faults and timeouts are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Driver(e) => e.is_transient(),
            Self::Storage(_) | Self::ResourceTimeout { .. } => false,
        }
    }
}

/// Illegal registry operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("unknown task {0}")]
    UnknownTask(TaskId),

    #[error("duplicate task {0}")]
    DuplicateTask(TaskId),

    #[error("task {id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
}
