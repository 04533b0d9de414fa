//! Progress reporting for capture runs
//!
//! The orchestrator publishes a [`ProgressSnapshot`] after every status
//! write. Consumers attach as observers, channels or streams.

pub mod metrics;
pub mod publisher;
pub mod types;

pub use metrics::{MetricsSnapshot, PublisherMetrics};
pub use publisher::{ProgressPublisher, ProgressSubscriber};
pub use types::ProgressSnapshot;
