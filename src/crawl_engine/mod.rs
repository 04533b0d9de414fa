//! Crawl Engine Module
//!
//! Task model, retry policy, task registry, the wave scheduler and the
//! `CaptureService` control surface built on top of them.

// Sub-modules
pub mod attempt;
pub mod crawl_types;
pub mod deadline;
pub mod orchestrator;
pub mod registry;
pub mod retry;
pub mod service;

// Re-export crawl types
pub use crawl_types::{
    CrawlError, CrawlResult, RegistryError, SiteDescriptor, TaskError, TaskId, TaskRecord,
    TaskStatus,
};

// Re-export orchestration for advanced usage
pub use orchestrator::{RunContext, TaskOutcome, dispatch_waves, expand_tasks, run_capture};
pub use registry::{StatusCounts, TaskRegistry};
pub use retry::RetryPolicy;
pub use service::CaptureService;
