//! Pipeline configuration
//!
//! One serde/TOML document covering everything operators tune at runtime:
//! the two rate modes, provider permissions, buffer retention and the
//! adaptive-sampling knobs.
//!
//! Mode values are stored as raw strings on purpose — the settings layer
//! that writes them is outside this crate and free-form. They are parsed
//! (and rejected) when the rate controller recomputes, never at load time,
//! so a config file with a bad mode still loads and every other setting
//! takes effect.
//!
//! [`ConfigStore`] is the shared handle the pipeline components read from;
//! external settings UIs write through it and then ask the pipeline to
//! re-apply.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Default per-producer buffer retention cap.
pub const DEFAULT_RETENTION_CAP: usize = 5_000;

/// Default adaptive-sampling delta threshold.
pub const DEFAULT_ADAPTIVE_THRESHOLD: f64 = 10.0;

/// Default quiet period before a sensor is considered idle (5 minutes).
pub const DEFAULT_QUIET_PERIOD_MS: i64 = 300_000;

/// Default idle interval backoff factor.
pub const DEFAULT_IDLE_BACKOFF: f64 = 3.0;

/// Default location fix staleness bound (5 minutes).
pub const DEFAULT_FIX_STALENESS_MS: i64 = 300_000;

/// Default grace period for an unproductive location provider (2 minutes).
pub const DEFAULT_PROVIDER_GRACE_MS: i64 = 120_000;

/// Knobs of the adaptive sampling policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Minimum |delta| between consecutive samples that counts as change.
    pub threshold: f64,

    /// How long a sensor must stay under the threshold to be idle, ms.
    pub quiet_period_ms: i64,

    /// Sampling interval multiplier applied while a sensor is idle.
    pub idle_backoff: f64,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_ADAPTIVE_THRESHOLD,
            quiet_period_ms: DEFAULT_QUIET_PERIOD_MS,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

/// Complete runtime configuration of the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sampling rate mode: `rarely`, `normal`, `often` or `real-time`.
    pub sample_rate: String,

    /// Transmission rate mode: `rarely`, `eco`, `normal`, `often` or
    /// `real-time`.
    pub sync_rate: String,

    /// Whether the GPS provider may be used at all.
    pub gps_allowed: bool,

    /// Whether the network location provider may be used at all.
    pub network_allowed: bool,

    /// Per-producer buffer retention cap, in entries.
    pub retention_cap: usize,

    /// Age beyond which a location fix no longer counts as fresh, ms.
    pub fix_staleness_ms: i64,

    /// How long a listening provider may go without a fresh fix before it
    /// is switched off as unproductive, ms.
    pub provider_grace_ms: i64,

    pub adaptive: AdaptiveConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: "normal".to_string(),
            sync_rate: "normal".to_string(),
            gps_allowed: true,
            network_allowed: true,
            retention_cap: DEFAULT_RETENTION_CAP,
            fix_staleness_ms: DEFAULT_FIX_STALENESS_MS,
            provider_grace_ms: DEFAULT_PROVIDER_GRACE_MS,
            adaptive: AdaptiveConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        toml::from_str(&content).map_err(|e| {
            PipelineError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })
    }

    /// Load from a TOML file, falling back to defaults on any failure.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Serialization(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            PipelineError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }
}

/// Shared, concurrently readable configuration handle.
#[derive(Default)]
pub struct ConfigStore {
    inner: RwLock<PipelineConfig>,
}

impl ConfigStore {
    pub fn new(config: PipelineConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(config),
        })
    }

    /// A consistent snapshot of the current configuration.
    pub fn snapshot(&self) -> PipelineConfig {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Apply a mutation atomically. Takes effect for components on their
    /// next read; call the pipeline's `apply_config` to push new rates.
    pub fn update(&self, mutate: impl FnOnce(&mut PipelineConfig)) {
        let mut config = self.inner.write().unwrap_or_else(|e| e.into_inner());
        mutate(&mut config);
    }
}
