//! Run directory manager
//!
//! Layout: `{storage_dir}/task_{timestamp}/{entity}/{site}_{timestamp}.png`.
//! Directory creation is idempotent; only real filesystem faults surface as
//! [`StorageError`].

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::utils::{RUN_DIR_PREFIX, format_timestamp};

/// A filesystem operation on the artifact tree failed
#[derive(Debug, Error)]
#[error("storage error at {}: {source}", path.display())]
pub struct StorageError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl StorageError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Replace every path-unsafe character with `_`
///
/// Also neutralizes names the filesystem treats specially (`..`, reserved
/// device names, trailing dots) and never returns an empty string.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    let cleaned = sanitize_filename::sanitize_with_options(
        name,
        sanitize_filename::Options {
            windows: true,
            truncate: true,
            replacement: "_",
        },
    );
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Name of the run directory for a run started at `as_of`
#[must_use]
pub fn run_dir_name(as_of: DateTime<Utc>) -> String {
    format!("{RUN_DIR_PREFIX}{}", format_timestamp(as_of))
}

/// Create (or reuse) the root directory of a run
pub async fn create_run_dir(storage_dir: &Path, as_of: DateTime<Utc>) -> Result<PathBuf, StorageError> {
    let path = storage_dir.join(run_dir_name(as_of));
    ensure_dir(&path).await?;
    log::debug!("Run directory ready: {}", path.display());
    Ok(path)
}

/// Create (or reuse) the directory holding one entity's screenshots
pub async fn create_entity_dir(run_root: &Path, entity: &str) -> Result<PathBuf, StorageError> {
    let path = run_root.join(sanitize_name(entity));
    ensure_dir(&path).await?;
    Ok(path)
}

async fn ensure_dir(path: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::new(path, e))
}
