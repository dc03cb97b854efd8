//! Periodic draining of the local buffer into an upstream sink.
//!
//! The sink is a capability trait; the real uplink (HTTP, MQTT, a radio
//! link) lives outside this crate. The transmitter only decides *when* to
//! flush and *what* a flush covers, and guarantees that buffered data
//! survives every failed attempt.

#[cfg(any(test, feature = "mock-sink"))]
pub mod mock;

use crate::buffer::{AppendListener, LocalBuffer};
use crate::clock::Clock;
use crate::error::Result;
use crate::scheduler::{ScheduledTask, Scheduler};
use crate::types::DataPoint;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Errors from the upstream sink.
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// The sink cannot be reached at all (offline, link down).
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The sink refused the batch.
    #[error("sink rejected batch from '{producer}': {reason}")]
    Rejected { producer: String, reason: String },

    /// The sink did not answer within its own bounded timeout.
    #[error("sink timed out after {0}ms")]
    Timeout(u64),
}

/// Upstream delivery capability.
///
/// A call covers one producer's batch in insertion order. Implementations
/// must bound their own blocking time; the transmitter holds its flush
/// guard for the duration of the call.
#[cfg_attr(test, mockall::automock)]
pub trait TransmitSink: Send + Sync {
    fn transmit(
        &self,
        producer: &str,
        batch: &[Arc<DataPoint>],
    ) -> std::result::Result<(), TransmitError>;
}

/// Drains untransmitted buffer entries to the sink on a schedule.
///
/// Flush condition: the transmission interval has elapsed since the last
/// flush. The condition is evaluated on every scheduler trigger, or — when
/// the task interval is zero (real-time sampling) — on every buffer append
/// via [`AppendListener`].
pub struct Transmitter {
    clock: Arc<dyn Clock>,
    buffer: Arc<LocalBuffer>,
    sink: Arc<dyn TransmitSink>,
    scheduler: Arc<Scheduler>,
    tx_interval: AtomicI64,
    last_flush: AtomicI64,
    flushing: AtomicBool,
}

impl Transmitter {
    pub fn new(
        clock: Arc<dyn Clock>,
        buffer: Arc<LocalBuffer>,
        sink: Arc<dyn TransmitSink>,
        scheduler: Arc<Scheduler>,
    ) -> Arc<Self> {
        let now = clock.now_ms();
        Arc::new(Self {
            clock,
            buffer,
            sink,
            scheduler,
            tx_interval: AtomicI64::new(i64::MAX),
            last_flush: AtomicI64::new(now),
            flushing: AtomicBool::new(false),
        })
    }

    /// Apply a transmission interval and a task-check interval.
    ///
    /// A positive task interval (re)schedules the periodic check with a
    /// tolerance of a tenth of the interval. A task interval of zero means
    /// the check runs on every buffer append instead; the scheduled task is
    /// dropped.
    pub fn start(self: &Arc<Self>, tx_interval: i64, task_interval: i64) -> Result<()> {
        self.tx_interval.store(tx_interval, Ordering::SeqCst);
        let as_task: Arc<dyn ScheduledTask> = Arc::clone(self) as Arc<dyn ScheduledTask>;
        if task_interval > 0 {
            tracing::info!(tx_interval, task_interval, "transmitter on scheduled checks");
            self.scheduler
                .register(as_task, task_interval, task_interval / 10)?;
        } else {
            tracing::info!(tx_interval, "transmitter on per-append checks");
            self.scheduler.unregister(&as_task);
        }
        Ok(())
    }

    /// Unschedule the periodic check. Buffered data stays put.
    pub fn stop(self: &Arc<Self>) {
        let as_task: Arc<dyn ScheduledTask> = Arc::clone(self) as Arc<dyn ScheduledTask>;
        self.scheduler.unregister(&as_task);
    }

    /// Evaluate the flush condition once; flush if due.
    ///
    /// At most one flush runs at a time — a check arriving while another
    /// flush is in progress is dropped, not queued.
    pub fn check(&self) -> Result<()> {
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("flush already in progress, skipping check");
            return Ok(());
        }
        let outcome = self.check_locked();
        self.flushing.store(false, Ordering::SeqCst);
        outcome
    }

    fn check_locked(&self) -> Result<()> {
        let now = self.clock.now_ms();
        let interval = self.tx_interval.load(Ordering::SeqCst);
        if now - self.last_flush.load(Ordering::SeqCst) < interval {
            return Ok(());
        }
        self.last_flush.store(now, Ordering::SeqCst);

        let mut first_error = None;
        for (producer, entries) in self.buffer.untransmitted_by_producer() {
            let batch: Vec<Arc<DataPoint>> =
                entries.iter().map(|e| Arc::clone(e.point())).collect();
            match self.sink.transmit(&producer, &batch) {
                Ok(()) => {
                    // purge exactly the entries this batch covered; points
                    // that arrived during the sink call stay buffered
                    let seqs: Vec<u64> = entries.iter().map(|e| e.seq()).collect();
                    let removed = self.buffer.remove_seqs(&producer, &seqs);
                    tracing::debug!(producer = %producer, removed, "batch transmitted");
                }
                Err(e) => {
                    tracing::warn!(
                        producer = %producer,
                        "transmission failed, keeping batch for next cycle: {}", e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

impl ScheduledTask for Transmitter {
    fn name(&self) -> &str {
        "transmitter"
    }

    fn run(&self) -> Result<()> {
        self.check()
    }
}

impl AppendListener for Transmitter {
    fn on_append(&self) {
        if let Err(e) = self.check() {
            tracing::warn!("append-triggered flush failed: {}", e);
        }
    }
}
