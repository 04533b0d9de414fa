//! Deadline wrapper for a task's attempt cycle
//!
//! The deadline covers the whole cycle, backoff delays included. When it
//! fires the in-flight attempt is dropped, which closes its page through
//! the page guard.

use std::future::Future;
use std::time::Duration;

use super::crawl_types::{TaskError, TaskId};

/// Run `operation`, failing with [`TaskError::ResourceTimeout`] once `deadline` elapses
pub async fn with_task_deadline<F, T>(operation: F, deadline: Duration, task_id: &TaskId) -> Result<T, TaskError>
where
    F: Future<Output = Result<T, TaskError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(TaskError::ResourceTimeout {
            task_id: task_id.clone(),
            after: deadline,
        }),
    }
}
