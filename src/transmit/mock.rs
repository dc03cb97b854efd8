//! Mock Sink Implementation for Testing
//!
//! This module provides a recording sink that can be used for testing the
//! pipeline without a real uplink. Every batch is kept in memory for
//! inspection, and failures can be scripted to exercise the retry path.
//!
//! # Behavior modes
//!
//! - [`MockSinkMode::Accept`] - record the batch and report success
//! - [`MockSinkMode::Reject`] - record nothing and report a rejection
//! - [`MockSinkMode::Offline`] - record nothing and report the sink as
//!   unreachable
//!
//! # Enabling
//!
//! Outside of unit tests the mock sink is only available when the
//! `mock-sink` feature is enabled:
//!
//! ```bash
//! cargo test --features mock-sink
//! ```

use super::{TransmitError, TransmitSink};
use crate::types::DataPoint;
use std::sync::{Arc, Mutex};

/// How the mock responds to the next transmissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockSinkMode {
    #[default]
    Accept,
    Reject,
    Offline,
}

/// One recorded delivery.
#[derive(Debug, Clone)]
pub struct RecordedBatch {
    pub producer: String,
    pub points: Vec<Arc<DataPoint>>,
}

#[derive(Default)]
struct MockSinkState {
    mode: MockSinkMode,
    batches: Vec<RecordedBatch>,
    attempts: usize,
}

/// In-memory [`TransmitSink`] that records accepted batches.
#[derive(Default)]
pub struct MockSink {
    state: Mutex<MockSinkState>,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Switch the response mode; applies to all subsequent transmissions.
    pub fn set_mode(&self, mode: MockSinkMode) {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).mode = mode;
    }

    /// All accepted batches, in delivery order.
    pub fn batches(&self) -> Vec<RecordedBatch> {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .batches
            .clone()
    }

    /// Accepted points across all batches.
    pub fn total_points(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .batches
            .iter()
            .map(|b| b.points.len())
            .sum()
    }

    /// Transmission attempts, including rejected and offline ones.
    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).attempts
    }
}

impl TransmitSink for MockSink {
    fn transmit(
        &self,
        producer: &str,
        batch: &[Arc<DataPoint>],
    ) -> std::result::Result<(), TransmitError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.attempts += 1;
        match state.mode {
            MockSinkMode::Accept => {
                state.batches.push(RecordedBatch {
                    producer: producer.to_string(),
                    points: batch.to_vec(),
                });
                Ok(())
            }
            MockSinkMode::Reject => Err(TransmitError::Rejected {
                producer: producer.to_string(),
                reason: "scripted rejection".to_string(),
            }),
            MockSinkMode::Offline => {
                Err(TransmitError::Unavailable("scripted offline".to_string()))
            }
        }
    }
}
