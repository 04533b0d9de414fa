//! Type-safe builder for `CaptureConfig` using the typestate pattern
//!
//! The storage directory is the only required setting; `build()` is not
//! available until it has been provided.

use anyhow::{Result, anyhow};
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::CaptureConfig;

// Type states for the builder
pub struct WithStorageDir;

pub struct CaptureConfigBuilder<State = ()> {
    pub(crate) storage_dir: Option<PathBuf>,
    /// Optional settings, pre-filled with defaults
    pub(crate) settings: CaptureConfig,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for CaptureConfigBuilder<()> {
    fn default() -> Self {
        Self {
            storage_dir: None,
            settings: CaptureConfig::default(),
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfig {
    /// Create a builder for configuring a `CaptureConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> CaptureConfigBuilder<()> {
        CaptureConfigBuilder::default()
    }
}

impl CaptureConfigBuilder<()> {
    pub fn storage_dir(self, dir: impl Into<PathBuf>) -> CaptureConfigBuilder<WithStorageDir> {
        CaptureConfigBuilder {
            storage_dir: Some(dir.into()),
            settings: self.settings,
            _phantom: PhantomData,
        }
    }
}

// Build method only available when all required fields are set
impl CaptureConfigBuilder<WithStorageDir> {
    pub fn build(self) -> Result<CaptureConfig> {
        let storage_dir = self
            .storage_dir
            .ok_or_else(|| anyhow!("storage_dir is required"))?;

        let config = CaptureConfig {
            storage_dir,
            ..self.settings
        };
        validate(&config)?;
        Ok(config)
    }
}

impl CaptureConfig {
    /// Reject settings the orchestrator cannot honor
    pub fn validate(&self) -> Result<()> {
        validate(self)
    }
}

pub(crate) fn validate(config: &CaptureConfig) -> Result<()> {
    if config.max_concurrent_tasks == 0 {
        return Err(anyhow!("max_concurrent_tasks must be at least 1"));
    }
    if config.retry.max_attempts == 0 {
        return Err(anyhow!("retry.max_attempts must be at least 1"));
    }
    if !config.retry.backoff_factor.is_finite() || config.retry.backoff_factor < 1.0 {
        return Err(anyhow!(
            "retry.backoff_factor must be a finite value >= 1.0, got {}",
            config.retry.backoff_factor
        ));
    }
    if config.task_timeout.is_zero() {
        return Err(anyhow!("task_timeout must be greater than zero"));
    }
    if config.viewport_width == 0 || config.viewport_height == 0 {
        return Err(anyhow!(
            "viewport must be non-empty, got {}x{}",
            config.viewport_width,
            config.viewport_height
        ));
    }
    if config.max_typing_rounds == 0 {
        return Err(anyhow!("max_typing_rounds must be at least 1"));
    }
    Ok(())
}
