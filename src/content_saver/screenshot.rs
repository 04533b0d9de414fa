//! Screenshot persistence

use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::run_dirs::{StorageError, create_entity_dir, sanitize_name};
use crate::utils::format_timestamp;

/// File name of a capture: `{site}_{timestamp}.png`
#[must_use]
pub fn screenshot_file_name(site: &str, taken_at: DateTime<Utc>) -> String {
    format!("{}_{}.png", sanitize_name(site), format_timestamp(taken_at))
}

/// Write a PNG into the entity's directory and return its path
///
/// The bytes land in a temp file first and are renamed into place, so a
/// screenshot path never points at a partial file. An existing file at the
/// target path is never replaced; that case is a [`StorageError`].
pub async fn save_screenshot(
    run_root: &Path,
    entity: &str,
    site: &str,
    png: Vec<u8>,
    taken_at: DateTime<Utc>,
) -> Result<PathBuf, StorageError> {
    let dir = create_entity_dir(run_root, entity).await?;
    let path = dir.join(screenshot_file_name(site, taken_at));

    let target = path.clone();
    tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::new(&dir, e))?;
        temp.write_all(&png)
            .map_err(|e| StorageError::new(temp.path(), e))?;
        temp.persist_noclobber(&target)
            .map_err(|e| StorageError::new(&target, e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| StorageError::new(&path, std::io::Error::other(e)))??;

    log::debug!("Saved screenshot {}", path.display());
    Ok(path)
}
