//! # SensePipe-RS: Device-Resident Sensor Data Pipeline
//!
//! A pipeline core for battery-constrained devices that continuously
//! sample sensors: producers and consumers are decoupled through a
//! subscription bus, sampled data is buffered locally, and an adaptive
//! scheduler decides when to sample and when to ship buffered batches
//! upstream.
//!
//! ## Architecture
//!
//! - **Bus**: name-indexed producer/consumer registry with producer-side
//!   fan-out
//! - **Scheduler**: timer thread with tolerance-based wake-up coalescing,
//!   dispatching to a crossbeam worker pool
//! - **Control**: operator-chosen rate modes plus per-sensor adaptive
//!   policies (signal hysteresis, location provider productivity)
//! - **Buffer**: bounded per-producer FIFO with a constrained predicate
//!   language
//! - **Transmit**: interval-gated draining of the buffer into a pluggable
//!   sink
//!
//! Sensor drivers and the upstream protocol stay outside the crate; they
//! plug in through the [`bus::DataProducer`], [`bus::DataConsumer`] and
//! [`transmit::TransmitSink`] traits.
//!
//! ## Example
//!
//! ```ignore
//! use sensepipe_rs::{
//!     bus::ProducerHub,
//!     config::{ConfigStore, PipelineConfig},
//!     pipeline::Pipeline,
//!     types::{DataPoint, DataValue},
//! };
//! use std::sync::Arc;
//!
//! let config = ConfigStore::new(PipelineConfig::load_or_default("pipeline.toml"));
//! let sink = Arc::new(MyUplink::connect()?);
//! let pipeline = Pipeline::new(config, sink);
//!
//! // a driver registers its producer and the pipeline buffers it
//! let light = Arc::new(ProducerHub::new("light"));
//! pipeline.bus().register_producer("light", light.clone());
//! pipeline.buffer_producer("light");
//!
//! pipeline.start()?;
//! light.emit(DataPoint::new("light", now_ms, DataValue::Float(412.0))?);
//! ```

pub mod buffer;
pub mod bus;
pub mod clock;
pub mod config;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod transmit;
pub mod types;

// Re-export commonly used types
pub use bus::{DataConsumer, DataProducer, ProducerHub, SubscriptionBus};
pub use config::{ConfigStore, PipelineConfig};
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use types::{DataPoint, DataType, DataValue};
