//! Top-level wiring of the pipeline components.
//!
//! [`Pipeline`] owns one of everything — bus, buffer, scheduler,
//! transmitter, rate controller — and connects them. All dependencies are
//! injected (clock, sink, config store), nothing is process-global: a test
//! can run several pipelines side by side with manual clocks and mock
//! sinks.
//!
//! Sensor drivers remain external. They register their producers on
//! [`Pipeline::bus`] and the pipeline subscribes its buffer to the
//! producer names it should persist.

use crate::buffer::{BufferConsumer, LocalBuffer};
use crate::bus::{DataConsumer, SubscriptionBus};
use crate::clock::{Clock, SystemClock};
use crate::config::ConfigStore;
use crate::control::{RateController, RatePlan};
use crate::error::Result;
use crate::scheduler::Scheduler;
use crate::transmit::{TransmitSink, Transmitter};
use std::sync::Arc;

/// Worker threads for scheduled task execution.
const SCHEDULER_WORKERS: usize = 2;

/// One fully wired pipeline instance.
pub struct Pipeline {
    config: Arc<ConfigStore>,
    bus: Arc<SubscriptionBus>,
    buffer: Arc<LocalBuffer>,
    buffer_consumer: Arc<BufferConsumer>,
    scheduler: Arc<Scheduler>,
    transmitter: Arc<Transmitter>,
    controller: RateController,
}

impl Pipeline {
    /// Build a pipeline on the system clock.
    pub fn new(config: Arc<ConfigStore>, sink: Arc<dyn TransmitSink>) -> Self {
        Self::with_clock(config, sink, Arc::new(SystemClock::new()))
    }

    /// Build a pipeline on an injected clock (tests use a manual one).
    pub fn with_clock(
        config: Arc<ConfigStore>,
        sink: Arc<dyn TransmitSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retention_cap = config.snapshot().retention_cap;
        let bus = SubscriptionBus::shared();
        let buffer = LocalBuffer::shared(Arc::clone(&clock), retention_cap);
        let buffer_consumer = BufferConsumer::new(Arc::clone(&buffer));
        let scheduler = Scheduler::shared(Arc::clone(&clock), SCHEDULER_WORKERS);
        let transmitter = Transmitter::new(clock, Arc::clone(&buffer), sink, Arc::clone(&scheduler));
        let controller = RateController::new(Arc::clone(&config), Arc::clone(&transmitter));
        Self {
            config,
            bus,
            buffer,
            buffer_consumer,
            scheduler,
            transmitter,
            controller,
        }
    }

    /// Start the scheduler and apply the current configuration.
    pub fn start(&self) -> Result<RatePlan> {
        tracing::info!("pipeline starting");
        self.scheduler.start();
        self.apply_config()
    }

    /// Stop transmission scheduling and the scheduler threads. Buffered
    /// data and bus subscriptions stay intact for a later restart.
    pub fn stop(&self) {
        tracing::info!("pipeline stopping");
        self.transmitter.stop();
        self.scheduler.stop();
    }

    /// Re-apply the configuration: recompute rates, push the retention
    /// cap, and rewire the transmitter's check trigger.
    ///
    /// A configuration error (unknown mode string) is returned and leaves
    /// the running schedule untouched.
    pub fn apply_config(&self) -> Result<RatePlan> {
        let plan = self.controller.recompute()?;
        self.buffer.set_retention_cap(self.config.snapshot().retention_cap);
        if plan.task_interval == 0 {
            // real-time sampling: evaluate the flush condition on every
            // accepted point instead of on a timer
            self.buffer_consumer
                .set_append_listener(Arc::clone(&self.transmitter) as _);
        } else {
            self.buffer_consumer.clear_append_listener();
        }
        Ok(plan)
    }

    /// Subscribe the local buffer to a producer name. Points emitted under
    /// that name are buffered for transmission from then on.
    pub fn buffer_producer(&self, name: &str) -> bool {
        self.bus
            .subscribe_consumer(name, Arc::clone(&self.buffer_consumer) as Arc<dyn DataConsumer>)
    }

    /// Stop buffering a producer name.
    pub fn unbuffer_producer(&self, name: &str) {
        let as_consumer = Arc::clone(&self.buffer_consumer) as Arc<dyn DataConsumer>;
        self.bus.unsubscribe_consumer(name, &as_consumer);
    }

    pub fn bus(&self) -> &Arc<SubscriptionBus> {
        &self.bus
    }

    pub fn buffer(&self) -> &Arc<LocalBuffer> {
        &self.buffer
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{DataProducer, ProducerHub};
    use crate::clock::ManualClock;
    use crate::config::PipelineConfig;
    use crate::transmit::MockTransmitSink;
    use crate::types::{DataPoint, DataValue};

    fn pipeline_with(sample: &str, sync: &str, sink: MockTransmitSink) -> (Pipeline, Arc<ManualClock>) {
        let clock = ManualClock::shared(0);
        let config = ConfigStore::new(PipelineConfig {
            sample_rate: sample.to_string(),
            sync_rate: sync.to_string(),
            ..PipelineConfig::default()
        });
        (
            Pipeline::with_clock(config, Arc::new(sink), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_emitted_points_land_in_the_buffer() {
        let mut sink = MockTransmitSink::new();
        sink.expect_transmit().never();
        let (pipeline, _) = pipeline_with("normal", "normal", sink);

        let hub = Arc::new(ProducerHub::new("light"));
        pipeline
            .bus()
            .register_producer("light", hub.clone() as Arc<dyn DataProducer>);
        assert!(pipeline.buffer_producer("light"));

        hub.emit(DataPoint::new("light", 10, DataValue::Float(1.0)).unwrap());
        assert_eq!(pipeline.buffer().len_for("light"), 1);
    }

    #[test]
    fn test_real_time_mode_flushes_on_append() {
        let mut sink = MockTransmitSink::new();
        sink.expect_transmit().times(1).returning(|_, _| Ok(()));
        let (pipeline, clock) = pipeline_with("real-time", "real-time", sink);
        pipeline.apply_config().unwrap();

        let hub = Arc::new(ProducerHub::new("light"));
        pipeline
            .bus()
            .register_producer("light", hub.clone() as Arc<dyn DataProducer>);
        pipeline.buffer_producer("light");

        // past the tx interval, the append itself triggers the flush
        clock.set(crate::control::OFTEN_MS);
        hub.emit(DataPoint::new("light", 10, DataValue::Float(1.0)).unwrap());
        assert!(pipeline.buffer().is_empty());
    }

    #[test]
    fn test_bad_config_is_rejected_on_apply() {
        let mut sink = MockTransmitSink::new();
        sink.expect_transmit().never();
        let (pipeline, _) = pipeline_with("normal", "normal", sink);
        pipeline.apply_config().unwrap();

        pipeline.config().update(|c| c.sample_rate = "ludicrous".to_string());
        assert!(pipeline.apply_config().is_err());
        // prior transmitter schedule is still in place
        assert_eq!(pipeline.scheduler().task_count(), 1);
    }
}
