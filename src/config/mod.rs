//! Configuration module for entity capture runs
//!
//! This module provides the `CaptureConfig` struct and its type-safe builder
//! for configuring capture runs with validation and sensible defaults, plus
//! an environment loader for the binary.

// Sub-modules
pub mod builder;
pub mod env;
pub mod getters;
pub mod methods;
pub mod types;

// Re-exports for public API
pub use builder::{CaptureConfigBuilder, WithStorageDir};
pub use types::{CaptureConfig, HumanizeConfig, RetryConfig};
