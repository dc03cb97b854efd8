//! Per-sensor adaptive sampling with hysteresis.
//!
//! For a continuous analog sensor (ambient light, noise level) the policy
//! tracks the most recent accepted sample. A jump of at least the
//! configured threshold marks the sensor as changed immediately; dropping
//! back to idle requires the signal to stay flat for a whole quiet period
//! first. The asymmetry is the point: a noisy signal hovering around the
//! threshold must not make the sampling interval oscillate.
//!
//! The policy is pure state — it owns no timer and is driven by
//! `observe(value, now)` from whatever thread handles that sensor's data.

use crate::config::AdaptiveConfig;

/// Activity classification of one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// Signal flat for at least the quiet period.
    Idle,
    /// A significant change was seen recently.
    Changed,
}

/// Hysteresis state for one continuous sensor.
#[derive(Debug, Clone)]
pub struct AdaptivePolicy {
    threshold: f64,
    quiet_period_ms: i64,
    idle_backoff: f64,
    last_value: Option<f64>,
    activity: Activity,
    last_change_at: i64,
}

impl AdaptivePolicy {
    pub fn new(config: &AdaptiveConfig) -> Self {
        Self {
            threshold: config.threshold,
            quiet_period_ms: config.quiet_period_ms,
            idle_backoff: config.idle_backoff,
            last_value: None,
            activity: Activity::Idle,
            last_change_at: 0,
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    /// Feed one sample. Returns the new activity only on an idle↔changed
    /// transition; `None` means nothing should be rescheduled.
    ///
    /// The first sample ever seen establishes the baseline and never
    /// counts as a change.
    pub fn observe(&mut self, value: f64, now: i64) -> Option<Activity> {
        let delta = self.last_value.map(|prev| (value - prev).abs());
        self.last_value = Some(value);

        match delta {
            Some(d) if d >= self.threshold => {
                self.last_change_at = now;
                if self.activity == Activity::Idle {
                    self.activity = Activity::Changed;
                    tracing::debug!(delta = d, "sensor active, restoring base interval");
                    return Some(Activity::Changed);
                }
                None
            }
            _ => {
                if self.activity == Activity::Changed
                    && now - self.last_change_at > self.quiet_period_ms
                {
                    self.activity = Activity::Idle;
                    tracing::debug!("sensor quiet, backing sampling off");
                    return Some(Activity::Idle);
                }
                None
            }
        }
    }

    /// The sampling interval to use for this sensor given its activity.
    pub fn scaled_interval(&self, base_interval_ms: i64) -> i64 {
        match self.activity {
            Activity::Changed => base_interval_ms,
            Activity::Idle => (base_interval_ms as f64 * self.idle_backoff) as i64,
        }
    }
}
