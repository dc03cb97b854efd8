//! Location provider power policy.
//!
//! Keeping a GPS receiver listening while it produces no fixes (indoors,
//! urban canyon) is the single biggest battery drain in the original
//! system this pipeline descends from, so providers are managed
//! individually: a provider is switched on only while it is both permitted
//! and useful, and switched off again once it has been listening past a
//! grace period without delivering a fresh fix.
//!
//! Like the adaptive policy this is pure state plus `evaluate(now)`; the
//! actual provider drivers live outside the crate and report back through
//! the `note_*` methods.

use crate::config::PipelineConfig;

/// The two classes of location provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Gps,
    Network,
}

/// What the surrounding driver should do with a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderCommand {
    Enable(Provider),
    Disable(Provider),
}

#[derive(Debug, Clone, Default)]
struct ProviderState {
    allowed: bool,
    listening: bool,
    listening_since: i64,
    last_fix_at: Option<i64>,
}

/// Per-provider enable/disable decisions.
#[derive(Debug, Clone)]
pub struct LocationPolicy {
    fix_staleness_ms: i64,
    grace_ms: i64,
    gps: ProviderState,
    network: ProviderState,
}

impl LocationPolicy {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            fix_staleness_ms: config.fix_staleness_ms,
            grace_ms: config.provider_grace_ms,
            gps: ProviderState {
                allowed: config.gps_allowed,
                ..ProviderState::default()
            },
            network: ProviderState {
                allowed: config.network_allowed,
                ..ProviderState::default()
            },
        }
    }

    fn state(&self, provider: Provider) -> &ProviderState {
        match provider {
            Provider::Gps => &self.gps,
            Provider::Network => &self.network,
        }
    }

    fn state_mut(&mut self, provider: Provider) -> &mut ProviderState {
        match provider {
            Provider::Gps => &mut self.gps,
            Provider::Network => &mut self.network,
        }
    }

    /// Operator permission for a provider.
    pub fn set_allowed(&mut self, provider: Provider, allowed: bool) {
        self.state_mut(provider).allowed = allowed;
    }

    /// The driver confirmed the provider is now listening.
    pub fn note_listening(&mut self, provider: Provider, now: i64) {
        let state = self.state_mut(provider);
        state.listening = true;
        state.listening_since = now;
    }

    /// The driver confirmed the provider was switched off.
    pub fn note_stopped(&mut self, provider: Provider) {
        self.state_mut(provider).listening = false;
    }

    /// A fix arrived from a provider.
    pub fn note_fix(&mut self, provider: Provider, at: i64) {
        self.state_mut(provider).last_fix_at = Some(at);
    }

    pub fn is_listening(&self, provider: Provider) -> bool {
        self.state(provider).listening
    }

    /// Decide what to do with each provider at `now`.
    pub fn evaluate(&self, now: i64) -> Vec<ProviderCommand> {
        let mut commands = Vec::new();
        for provider in [Provider::Gps, Provider::Network] {
            if let Some(command) = self.evaluate_provider(provider, now) {
                commands.push(command);
            }
        }
        commands
    }

    fn evaluate_provider(&self, provider: Provider, now: i64) -> Option<ProviderCommand> {
        let state = self.state(provider);

        if !state.allowed {
            return state.listening.then_some(ProviderCommand::Disable(provider));
        }

        if !state.listening {
            // wake it up only if we have no usable fix
            let fix_fresh = state
                .last_fix_at
                .is_some_and(|t| now - t <= self.fix_staleness_ms);
            return (!fix_fresh).then_some(ProviderCommand::Enable(provider));
        }

        // listening: switch off once the grace period passes with nothing
        // to show for it
        let productive = state
            .last_fix_at
            .is_some_and(|t| t >= state.listening_since && now - t <= self.fix_staleness_ms);
        if !productive && now - state.listening_since > self.grace_ms {
            tracing::info!(?provider, "provider unproductive, disabling");
            return Some(ProviderCommand::Disable(provider));
        }
        None
    }
}
