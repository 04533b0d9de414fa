//! Progress publisher
//!
//! Every status write on the registry is followed by exactly one `publish`.
//! Publications are serialized, so subscribers see snapshots in strictly
//! increasing `sequence` order. Delivery is synchronous and unbuffered
//! (channel subscribers get an unbounded queue); a slow subscriber slows the
//! writer, it never causes a snapshot to be skipped.
//!
//! Subscribers must not call `publish` from inside their callback.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

use super::metrics::PublisherMetrics;
use super::types::ProgressSnapshot;
use crate::crawl_engine::registry::TaskRegistry;

/// Observer invoked with every published snapshot
pub trait ProgressSubscriber: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressSubscriber for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}

#[derive(Clone)]
enum Sink {
    Observer(Arc<dyn ProgressSubscriber>),
    Channel(mpsc::UnboundedSender<ProgressSnapshot>),
}

impl Sink {
    /// Deliver; `false` means the subscriber is gone for good
    fn deliver(&self, snapshot: &ProgressSnapshot) -> bool {
        match self {
            Self::Observer(observer) => {
                observer.on_progress(snapshot);
                true
            }
            Self::Channel(tx) => tx.send(snapshot.clone()).is_ok(),
        }
    }
}

#[derive(Default)]
pub struct ProgressPublisher {
    /// Last issued sequence number; held for the whole publication
    sequence: Mutex<u64>,
    sinks: Mutex<Vec<Sink>>,
    latest: Mutex<Option<ProgressSnapshot>>,
    metrics: PublisherMetrics,
}

impl ProgressPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer
    pub fn subscribe(&self, subscriber: Arc<dyn ProgressSubscriber>) {
        self.add_sink(Sink::Observer(subscriber));
    }

    /// Register a closure as observer
    pub fn subscribe_fn<F>(&self, callback: F)
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(callback));
    }

    /// Receive snapshots through an unbounded channel
    #[must_use]
    pub fn subscribe_channel(&self) -> mpsc::UnboundedReceiver<ProgressSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.add_sink(Sink::Channel(tx));
        rx
    }

    /// Receive snapshots as a `Stream`
    #[must_use]
    pub fn subscribe_stream(&self) -> UnboundedReceiverStream<ProgressSnapshot> {
        UnboundedReceiverStream::new(self.subscribe_channel())
    }

    /// Snapshot the registry and hand it to every subscriber
    pub fn publish(&self, registry: &TaskRegistry) -> u64 {
        let mut sequence = self.sequence.lock();
        *sequence += 1;

        let snapshot = ProgressSnapshot::capture(registry, *sequence);
        *self.latest.lock() = Some(snapshot.clone());

        // Deliver from a copy so observers may subscribe others
        let sinks = self.sinks.lock().clone();
        let mut closed = false;
        for sink in &sinks {
            if !sink.deliver(&snapshot) {
                closed = true;
                self.metrics.increment_dropped();
            }
        }
        if closed {
            let mut live = self.sinks.lock();
            live.retain(|sink| match sink {
                Sink::Channel(tx) => !tx.is_closed(),
                Sink::Observer(_) => true,
            });
            self.metrics.update_subscriber_count(live.len());
        }

        self.metrics.increment_published();
        trace!(
            sequence = snapshot.sequence,
            completed = snapshot.completed,
            failed = snapshot.failed,
            total = snapshot.total,
            "Progress published"
        );
        snapshot.sequence
    }

    /// Snapshot the registry without publishing it
    ///
    /// Carries the sequence number of the last publication.
    #[must_use]
    pub fn peek(&self, registry: &TaskRegistry) -> ProgressSnapshot {
        let sequence = *self.sequence.lock();
        ProgressSnapshot::capture(registry, sequence)
    }

    /// Most recently published snapshot
    #[must_use]
    pub fn latest(&self) -> Option<ProgressSnapshot> {
        self.latest.lock().clone()
    }

    #[must_use]
    pub fn metrics(&self) -> &PublisherMetrics {
        &self.metrics
    }

    fn add_sink(&self, sink: Sink) {
        let mut sinks = self.sinks.lock();
        sinks.push(sink);
        self.metrics.update_subscriber_count(sinks.len());
    }
}
