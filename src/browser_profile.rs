//! Chrome profile directories for capture sessions
//!
//! Each browser session gets its own UUID-named profile so a recycled session
//! never trips over the SingletonLock of the one it replaces.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of every profile directory this crate creates
pub const PROFILE_PREFIX: &str = "kodegen_sitecapture_chrome";

/// RAII wrapper for a Chrome profile directory
///
/// The directory is removed on drop unless `into_path()` transferred it to
/// another owner.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
    cleanup_on_drop: bool,
}

impl BrowserProfile {
    fn owned(path: PathBuf) -> Self {
        Self {
            path,
            cleanup_on_drop: true,
        }
    }

    /// Wrap a caller-supplied directory; it is left in place on drop
    pub fn pinned(path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;
        Ok(Self {
            path,
            cleanup_on_drop: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether dropping this profile deletes the directory
    pub fn is_ephemeral(&self) -> bool {
        self.cleanup_on_drop
    }

    /// Remove the directory now instead of on drop
    ///
    /// Call only after the browser using it has exited, Chrome keeps files
    /// open until then.
    pub fn remove(mut self) {
        self.remove_now();
    }

    fn remove_now(&mut self) {
        if !self.cleanup_on_drop {
            return;
        }
        self.cleanup_on_drop = false;
        if self.path.exists() {
            info!("Removing Chrome profile {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    "Failed to remove profile directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        self.remove_now();
    }
}

/// Create a fresh, uniquely named profile under the system temp directory
pub fn create_unique_profile() -> Result<BrowserProfile> {
    create_unique_profile_in(&std::env::temp_dir())
}

/// Create a fresh, uniquely named profile under `parent`
pub fn create_unique_profile_in(parent: &Path) -> Result<BrowserProfile> {
    let path = parent.join(format!("{}_{}", PROFILE_PREFIX, Uuid::new_v4()));
    debug!("Creating Chrome profile: {}", path.display());

    // create_dir, not create_dir_all: an existing directory means a collision
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    Ok(BrowserProfile::owned(path))
}
