//! Integration tests for bus connectivity semantics: both subscription
//! orders converge, registration is idempotent, and unregistration keeps
//! existing attachments alive.

mod common;

use common::builders::PointBuilder;
use common::RecordingConsumer;
use sensepipe_rs::bus::{DataConsumer, DataProducer, ProducerHub, SubscriptionBus};
use std::sync::Arc;

fn hub(name: &str) -> Arc<ProducerHub> {
    Arc::new(ProducerHub::new(name))
}

#[test]
fn test_subscribe_before_register_converges() {
    let bus = SubscriptionBus::new();
    let consumer = RecordingConsumer::new();
    let light = hub("light");

    assert!(!bus.subscribe_consumer("light", consumer.clone()));
    bus.register_producer("light", light.clone());

    light.emit(PointBuilder::new("light").timestamp(1).float(10.0).build());
    light.emit(PointBuilder::new("light").timestamp(2).float(11.0).build());
    assert_eq!(consumer.timestamps(), vec![1, 2]);
}

#[test]
fn test_register_before_subscribe_converges() {
    let bus = SubscriptionBus::new();
    let consumer = RecordingConsumer::new();
    let light = hub("light");

    bus.register_producer("light", light.clone());
    assert!(bus.subscribe_consumer("light", consumer.clone()));

    light.emit(PointBuilder::new("light").timestamp(3).float(10.0).build());
    assert_eq!(consumer.timestamps(), vec![3]);
}

#[test]
fn test_double_registration_does_not_duplicate_delivery() {
    let bus = SubscriptionBus::new();
    let consumer = RecordingConsumer::new();
    let light = hub("light");

    bus.register_producer("light", light.clone());
    bus.register_producer("light", light.clone());
    assert_eq!(bus.registered_producers("light").len(), 1);

    bus.subscribe_consumer("light", consumer.clone());
    light.emit(PointBuilder::new("light").timestamp(1).float(1.0).build());
    assert_eq!(consumer.count(), 1);
}

#[test]
fn test_unregistration_leaves_existing_attachments_flowing() {
    let bus = SubscriptionBus::new();
    let attached = RecordingConsumer::new();
    let late = RecordingConsumer::new();
    let light = hub("light");

    bus.register_producer("light", light.clone());
    bus.subscribe_consumer("light", attached.clone());

    let as_producer: Arc<dyn DataProducer> = light.clone();
    bus.unregister_producer("light", &as_producer);

    // new consumers no longer find the producer
    assert!(!bus.subscribe_consumer("light", late.clone()));

    light.emit(PointBuilder::new("light").timestamp(9).float(1.0).build());
    assert_eq!(attached.count(), 1);
    assert_eq!(late.count(), 0);
}

#[test]
fn test_consumer_attaches_to_every_producer_sharing_the_name() {
    let bus = SubscriptionBus::new();
    let consumer = RecordingConsumer::new();
    let a = hub("noise");
    let b = hub("noise");

    bus.register_producer("noise", a.clone());
    bus.register_producer("noise", b.clone());
    bus.subscribe_consumer("noise", consumer.clone());

    a.emit(PointBuilder::new("noise").timestamp(1).float(40.0).build());
    b.emit(PointBuilder::new("noise").timestamp(2).float(41.0).build());
    assert_eq!(consumer.timestamps(), vec![1, 2]);
}

#[test]
fn test_unsubscribe_is_complete_across_producers() {
    let bus = SubscriptionBus::new();
    let consumer = RecordingConsumer::new();
    let a = hub("noise");
    let b = hub("noise");

    bus.register_producer("noise", a.clone());
    bus.register_producer("noise", b.clone());
    bus.subscribe_consumer("noise", consumer.clone());

    let as_consumer: Arc<dyn DataConsumer> = consumer.clone();
    bus.unsubscribe_consumer("noise", &as_consumer);

    a.emit(PointBuilder::new("noise").timestamp(1).float(1.0).build());
    b.emit(PointBuilder::new("noise").timestamp(2).float(2.0).build());
    assert_eq!(consumer.count(), 0);
}
