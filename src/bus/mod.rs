//! Subscription bus: the name-indexed registry connecting producers to
//! consumers.
//!
//! Producers register under a sensor name; consumers subscribe to a name.
//! The bus resolves both orders to the same result — a consumer that
//! subscribes before "its" producer exists is attached the moment the
//! producer registers, and a producer that registers first picks up every
//! consumer that subscribes later. Data never flows through the bus
//! itself: attaching wires the consumer directly into the producer's
//! subscriber list, and fan-out happens producer-side (see
//! [`ProducerHub`]).
//!
//! There is exactly one bus per process by convention, constructed at
//! startup and passed by `Arc` to every collaborator. Nothing in here is a
//! hidden global.
//!
//! # Unregister asymmetry
//!
//! `unregister_producer` removes the producer from the registry only:
//! consumers already attached keep receiving its data until they
//! unsubscribe explicitly. Unregistering merely stops *new* consumers from
//! finding the producer. `unsubscribe_consumer`, by contrast, detaches the
//! consumer from every currently registered producer.

pub mod producer;

pub use producer::{DataConsumer, DataProducer, ProducerHub};

use producer::same_instance;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct BusState {
    /// Registered producers per sensor name, in registration order.
    producers: HashMap<String, Vec<Arc<dyn DataProducer>>>,
    /// Subscribed consumers per sensor name, in subscription order.
    consumers: HashMap<String, Vec<Arc<dyn DataConsumer>>>,
}

/// Process-wide registry of producers and consumers.
///
/// Mutating operations are mutually exclusive; the read accessors run
/// concurrently with each other and always observe a consistent snapshot.
#[derive(Default)]
pub struct SubscriptionBus {
    state: RwLock<BusState>,
}

impl SubscriptionBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle, the form collaborators expect.
    pub fn shared() -> Arc<SubscriptionBus> {
        Arc::new(Self::new())
    }

    /// Register a producer under `name`.
    ///
    /// Idempotent by instance identity: registering the same instance
    /// twice leaves the registry unchanged. On first registration, every
    /// consumer already subscribed to `name` is attached to the new
    /// producer.
    pub fn register_producer(&self, name: &str, producer: Arc<dyn DataProducer>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let producers = state.producers.entry(name.to_string()).or_default();
        if producers.iter().any(|p| same_instance(p, &producer)) {
            return;
        }
        producers.push(Arc::clone(&producer));

        // subscribe-before-register: attach the waiting consumers
        if let Some(subscribers) = state.consumers.get(name) {
            for subscriber in subscribers {
                producer.add_subscriber(Arc::clone(subscriber));
            }
        }
        tracing::debug!(sensor = name, "producer registered");
    }

    /// Subscribe a consumer to every producer registered under `name`,
    /// now and in the future.
    ///
    /// Idempotent by instance identity. Returns `true` if the consumer was
    /// attached to at least one currently registered producer; `false`
    /// means it is queued for a producer that does not exist yet (a normal
    /// outcome, not an error).
    pub fn subscribe_consumer(&self, name: &str, consumer: Arc<dyn DataConsumer>) -> bool {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let consumers = state.consumers.entry(name.to_string()).or_default();
        if consumers.iter().any(|c| same_instance(c, &consumer)) {
            return false;
        }
        consumers.push(Arc::clone(&consumer));

        let mut attached = false;
        if let Some(producers) = state.producers.get(name) {
            for producer in producers {
                attached |= producer.add_subscriber(Arc::clone(&consumer));
            }
        }
        tracing::debug!(sensor = name, attached, "consumer subscribed");
        attached
    }

    /// Remove a producer from the registry.
    ///
    /// Consumers already attached to it are deliberately left attached;
    /// see the module docs.
    pub fn unregister_producer(&self, name: &str, producer: &Arc<dyn DataProducer>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        if let Some(producers) = state.producers.get_mut(name) {
            producers.retain(|p| !same_instance(p, producer));
            if producers.is_empty() {
                state.producers.remove(name);
            }
            tracing::debug!(sensor = name, "producer unregistered");
        }
    }

    /// Remove a consumer from the registry and detach it from every
    /// producer currently registered under `name`.
    pub fn unsubscribe_consumer(&self, name: &str, consumer: &Arc<dyn DataConsumer>) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

        let Some(consumers) = state.consumers.get_mut(name) else {
            return;
        };
        consumers.retain(|c| !same_instance(c, consumer));
        if consumers.is_empty() {
            state.consumers.remove(name);
        }

        if let Some(producers) = state.producers.get(name) {
            for producer in producers {
                producer.remove_subscriber(consumer);
            }
        }
        tracing::debug!(sensor = name, "consumer unsubscribed");
    }

    /// Whether any producer is registered under `name`.
    pub fn is_producer_registered(&self, name: &str) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.producers.contains_key(name)
    }

    /// Whether this exact producer instance is registered under `name`.
    pub fn is_producer_instance_registered(
        &self,
        name: &str,
        producer: &Arc<dyn DataProducer>,
    ) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .producers
            .get(name)
            .is_some_and(|list| list.iter().any(|p| same_instance(p, producer)))
    }

    /// Whether this exact consumer instance is subscribed to `name`.
    pub fn is_consumer_subscribed(&self, name: &str, consumer: &Arc<dyn DataConsumer>) -> bool {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .consumers
            .get(name)
            .is_some_and(|list| list.iter().any(|c| same_instance(c, consumer)))
    }

    /// Snapshot of the producers registered under `name`, in registration
    /// order. A defensive copy: mutating it does not touch the registry.
    pub fn registered_producers(&self, name: &str) -> Vec<Arc<dyn DataProducer>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.producers.get(name).cloned().unwrap_or_default()
    }

    /// Snapshot of the consumers subscribed to `name`, in subscription
    /// order. A defensive copy.
    pub fn subscribed_consumers(&self, name: &str) -> Vec<Arc<dyn DataConsumer>> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.consumers.get(name).cloned().unwrap_or_default()
    }
}
