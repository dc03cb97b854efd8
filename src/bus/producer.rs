//! Producer and consumer capability traits, plus a reusable producer base.
//!
//! Sensor drivers stay outside this crate; they participate in the pipeline
//! through these two small traits. Identity of producers and consumers is
//! `Arc` pointer identity — two instances with identical behavior are still
//! two distinct participants, matching how the registry tracks membership.

use crate::error::Result;
use crate::types::DataPoint;
use std::sync::{Arc, Mutex};

/// Compare two trait-object handles by allocation identity.
///
/// `Arc::ptr_eq` on `dyn` trait objects also compares vtable pointers,
/// which is not the identity the registry needs; compare the data address
/// only.
pub(crate) fn same_instance<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// A sink that accepts data points from producers it has subscribed to.
///
/// `on_data` must return promptly — a consumer with slow work enqueues
/// internally. Errors are logged by the producer and never interrupt
/// fan-out to the remaining subscribers.
pub trait DataConsumer: Send + Sync {
    fn on_data(&self, point: Arc<DataPoint>) -> Result<()>;
}

/// A source of data points that supports subscriptions.
///
/// A producer is registered on the bus under a name that is not guaranteed
/// to be unique — several instances may share one name.
pub trait DataProducer: Send + Sync {
    /// Subscribe a consumer. Ignored (returns `false`) if this exact
    /// instance is already subscribed.
    fn add_subscriber(&self, consumer: Arc<dyn DataConsumer>) -> bool;

    /// Remove a consumer if present. Returns `true` if it was removed.
    fn remove_subscriber(&self, consumer: &Arc<dyn DataConsumer>) -> bool;

    /// Whether this exact consumer instance is subscribed.
    fn has_subscriber(&self, consumer: &Arc<dyn DataConsumer>) -> bool;

    /// Whether any consumer is subscribed.
    fn has_subscribers(&self) -> bool;
}

/// Ready-made [`DataProducer`] implementation for drivers.
///
/// Keeps an ordered subscriber list and fans every emitted point out in
/// subscription order. A consumer that returns an error is logged and
/// skipped; delivery to the remaining subscribers continues.
pub struct ProducerHub {
    name: String,
    subscribers: Mutex<Vec<Arc<dyn DataConsumer>>>,
}

impl ProducerHub {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The name this producer emits under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deliver one point to every subscriber, in subscription order.
    ///
    /// Returns the number of successful deliveries. Safe to call from any
    /// thread; concurrent emits interleave at point granularity.
    pub fn emit(&self, point: DataPoint) -> usize {
        self.emit_shared(point.into_shared())
    }

    /// Like [`emit`](Self::emit) for a point that is already shared.
    pub fn emit_shared(&self, point: Arc<DataPoint>) -> usize {
        // Snapshot under the lock, deliver outside it: a consumer that
        // re-enters (e.g. unsubscribes itself) must not deadlock.
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut delivered = 0;
        for subscriber in &subscribers {
            match subscriber.on_data(Arc::clone(&point)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(producer = %self.name, "subscriber rejected data point: {}", e);
                }
            }
        }
        delivered
    }
}

impl DataProducer for ProducerHub {
    fn add_subscriber(&self, consumer: Arc<dyn DataConsumer>) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        if subscribers.iter().any(|s| same_instance(s, &consumer)) {
            return false;
        }
        subscribers.push(consumer);
        true
    }

    fn remove_subscriber(&self, consumer: &Arc<dyn DataConsumer>) -> bool {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        let before = subscribers.len();
        subscribers.retain(|s| !same_instance(s, consumer));
        subscribers.len() != before
    }

    fn has_subscriber(&self, consumer: &Arc<dyn DataConsumer>) -> bool {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .any(|s| same_instance(s, consumer))
    }

    fn has_subscribers(&self) -> bool {
        !self.subscribers.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::types::DataValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConsumer {
        seen: AtomicUsize,
    }

    impl CountingConsumer {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: AtomicUsize::new(0),
            })
        }
    }

    impl DataConsumer for CountingConsumer {
        fn on_data(&self, _point: Arc<DataPoint>) -> Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingConsumer;

    impl DataConsumer for FailingConsumer {
        fn on_data(&self, _point: Arc<DataPoint>) -> Result<()> {
            Err(PipelineError::Consumer("always fails".to_string()))
        }
    }

    fn point() -> DataPoint {
        DataPoint::new("light", 100, DataValue::Float(42.0)).unwrap()
    }

    #[test]
    fn test_subscribe_is_idempotent_by_identity() {
        let hub = ProducerHub::new("light");
        let consumer = CountingConsumer::new();
        let as_dyn: Arc<dyn DataConsumer> = consumer.clone();

        assert!(hub.add_subscriber(as_dyn.clone()));
        assert!(!hub.add_subscriber(as_dyn.clone()));
        assert!(hub.has_subscriber(&as_dyn));

        hub.emit(point());
        assert_eq!(consumer.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_instances_both_subscribe() {
        let hub = ProducerHub::new("light");
        let a = CountingConsumer::new();
        let b = CountingConsumer::new();
        assert!(hub.add_subscriber(a.clone()));
        assert!(hub.add_subscriber(b.clone()));

        assert_eq!(hub.emit(point()), 2);
        assert_eq!(a.seen.load(Ordering::SeqCst), 1);
        assert_eq!(b.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failing_consumer_does_not_stop_fanout() {
        let hub = ProducerHub::new("light");
        let failing: Arc<dyn DataConsumer> = Arc::new(FailingConsumer);
        let counting = CountingConsumer::new();
        hub.add_subscriber(failing);
        hub.add_subscriber(counting.clone());

        assert_eq!(hub.emit(point()), 1);
        assert_eq!(counting.seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_remove_subscriber() {
        let hub = ProducerHub::new("light");
        let consumer = CountingConsumer::new();
        let as_dyn: Arc<dyn DataConsumer> = consumer.clone();
        hub.add_subscriber(as_dyn.clone());

        assert!(hub.remove_subscriber(&as_dyn));
        assert!(!hub.remove_subscriber(&as_dyn));
        assert!(!hub.has_subscribers());

        hub.emit(point());
        assert_eq!(consumer.seen.load(Ordering::SeqCst), 0);
    }
}
