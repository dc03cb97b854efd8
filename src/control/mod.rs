//! Rate control: from operator-chosen modes to concrete intervals.
//!
//! Two independent modes come out of the configuration as free-form
//! strings: how often sensors sample, and how often buffered data is
//! synced upstream. `recompute` parses both, derives the transmission
//! interval and the transmitter's check interval, and pushes them into the
//! transmitter. Unknown mode text aborts the recompute with a
//! configuration error and the previous schedule stays in effect — a typo
//! in the settings must never silently fall back to some default cadence.
//!
//! The per-sensor refinements live in the submodules: [`adaptive`] slows
//! an individual continuous sensor down while its signal is flat,
//! [`location`] switches location providers off when they stop producing
//! fixes.

pub mod adaptive;
pub mod location;

use crate::config::ConfigStore;
use crate::error::{PipelineError, Result};
use crate::transmit::Transmitter;
use std::str::FromStr;
use std::sync::Arc;

/// Base interval for the `rarely` mode (15 minutes).
pub const RARELY_MS: i64 = 900_000;
/// Base interval for the `eco` mode (30 minutes).
pub const ECO_MS: i64 = 1_800_000;
/// Base interval for the `normal` mode (5 minutes).
pub const NORMAL_MS: i64 = 300_000;
/// Base interval for the `often` mode (1 minute).
pub const OFTEN_MS: i64 = 60_000;

/// Operator-selected sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Rarely,
    Normal,
    Often,
    RealTime,
}

impl SampleRate {
    /// Nominal sampling interval, `None` for continuous sampling.
    pub fn base_interval_ms(self) -> Option<i64> {
        match self {
            SampleRate::Rarely => Some(RARELY_MS),
            SampleRate::Normal => Some(NORMAL_MS),
            SampleRate::Often => Some(OFTEN_MS),
            SampleRate::RealTime => None,
        }
    }
}

impl FromStr for SampleRate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rarely" => Ok(SampleRate::Rarely),
            "normal" => Ok(SampleRate::Normal),
            "often" => Ok(SampleRate::Often),
            "real-time" | "realtime" => Ok(SampleRate::RealTime),
            other => Err(PipelineError::Config(format!(
                "unknown sample rate '{other}' \
                 (expected rarely, normal, often or real-time)"
            ))),
        }
    }
}

/// Operator-selected transmission cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRate {
    Rarely,
    Eco,
    Normal,
    Often,
    RealTime,
}

impl FromStr for SyncRate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rarely" => Ok(SyncRate::Rarely),
            "eco" => Ok(SyncRate::Eco),
            "normal" => Ok(SyncRate::Normal),
            "often" => Ok(SyncRate::Often),
            "real-time" | "realtime" => Ok(SyncRate::RealTime),
            other => Err(PipelineError::Config(format!(
                "unknown sync rate '{other}' \
                 (expected rarely, eco, normal, often or real-time)"
            ))),
        }
    }
}

/// The two intervals a recompute produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePlan {
    /// Minimum time between flushes, ms.
    pub tx_interval: i64,
    /// How often the transmitter re-evaluates the flush condition, ms.
    /// Zero means on every buffer append instead of on a schedule.
    pub task_interval: i64,
}

/// Derive both intervals from the parsed modes.
///
/// A real-time sync mode couples the upload cadence to the sampling
/// cadence instead of using a fixed table entry: slow-sampling
/// configurations would otherwise upload near-empty batches.
pub fn plan_rates(sample: SampleRate, sync: SyncRate) -> RatePlan {
    let tx_interval = match sync {
        SyncRate::Rarely => RARELY_MS,
        SyncRate::Eco => ECO_MS,
        SyncRate::Normal => NORMAL_MS,
        SyncRate::Often => OFTEN_MS,
        SyncRate::RealTime => match sample {
            SampleRate::Rarely => ECO_MS * 3,
            SampleRate::Normal => NORMAL_MS * 3,
            SampleRate::Often => OFTEN_MS * 3,
            SampleRate::RealTime => OFTEN_MS,
        },
    };
    let task_interval = match sample {
        SampleRate::RealTime => 0,
        SampleRate::Often => 10_000,
        SampleRate::Normal => 60_000,
        SampleRate::Rarely => RARELY_MS,
    };
    RatePlan {
        tx_interval,
        task_interval,
    }
}

/// Applies the configured rate modes to the transmitter.
pub struct RateController {
    config: Arc<ConfigStore>,
    transmitter: Arc<Transmitter>,
}

impl RateController {
    pub fn new(config: Arc<ConfigStore>, transmitter: Arc<Transmitter>) -> Self {
        Self {
            config,
            transmitter,
        }
    }

    /// Re-read the configuration and reschedule the transmitter.
    ///
    /// On a bad mode string this returns a configuration error and leaves
    /// the previous schedule untouched.
    pub fn recompute(&self) -> Result<RatePlan> {
        let config = self.config.snapshot();
        let sample: SampleRate = config.sample_rate.parse().map_err(|e: PipelineError| {
            tracing::error!("recompute rejected, keeping current schedule: {}", e);
            e
        })?;
        let sync: SyncRate = config.sync_rate.parse().map_err(|e: PipelineError| {
            tracing::error!("recompute rejected, keeping current schedule: {}", e);
            e
        })?;

        let plan = plan_rates(sample, sync);
        tracing::info!(
            sample = ?sample,
            sync = ?sync,
            tx_interval = plan.tx_interval,
            task_interval = plan.task_interval,
            "rates recomputed"
        );
        self.transmitter.start(plan.tx_interval, plan.task_interval)?;
        Ok(plan)
    }
}
