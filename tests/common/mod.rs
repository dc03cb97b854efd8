//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use sensepipe_rs::bus::DataConsumer;
use sensepipe_rs::error::Result;
use sensepipe_rs::transmit::{TransmitError, TransmitSink};
use sensepipe_rs::types::DataPoint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};

/// Install a tracing subscriber once so failing tests show pipeline logs.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=sensepipe_rs=debug cargo test`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Consumer that records every point it receives.
pub struct RecordingConsumer {
    points: Mutex<Vec<Arc<DataPoint>>>,
}

impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            points: Mutex::new(Vec::new()),
        })
    }

    pub fn points(&self) -> Vec<Arc<DataPoint>> {
        self.points.lock().unwrap().clone()
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.points().iter().map(|p| p.timestamp()).collect()
    }

    pub fn count(&self) -> usize {
        self.points.lock().unwrap().len()
    }
}

impl DataConsumer for RecordingConsumer {
    fn on_data(&self, point: Arc<DataPoint>) -> Result<()> {
        self.points.lock().unwrap().push(point);
        Ok(())
    }
}

/// Sink that records accepted batches and can be switched offline.
pub struct RecordingSink {
    offline: AtomicBool,
    batches: Mutex<Vec<(String, Vec<Arc<DataPoint>>)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            offline: AtomicBool::new(false),
            batches: Mutex::new(Vec::new()),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<(String, Vec<Arc<DataPoint>>)> {
        self.batches.lock().unwrap().clone()
    }

    pub fn total_points(&self) -> usize {
        self.batches().iter().map(|(_, b)| b.len()).sum()
    }
}

impl TransmitSink for RecordingSink {
    fn transmit(
        &self,
        producer: &str,
        batch: &[Arc<DataPoint>],
    ) -> std::result::Result<(), TransmitError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransmitError::Unavailable("test sink offline".to_string()));
        }
        self.batches
            .lock()
            .unwrap()
            .push((producer.to_string(), batch.to_vec()));
        Ok(())
    }
}
