//! AutoMix state machine
//!
//! Exactly one state at any time. The orchestrator asks for
//! transitions; anything outside the allowed edge set is refused and
//! logged, which keeps a misbehaving event sequence from corrupting an
//! in-progress crossfade.

use serde::{Deserialize, Serialize};

/// Cooldown after a handover before re-planning resumes, in seconds
pub const COOLDOWN_SECS: f64 = 0.5;

/// Safety margin after the fade completes before the retired engine is
/// torn down, in seconds
pub const TEARDOWN_MARGIN_SECS: f64 = 1.0;

/// Abort ramp length when a crossfade is cancelled mid-fade, in seconds
pub const ABORT_RAMP_SECS: f64 = 0.2;

/// AutoMix lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutomixState {
    /// Disabled, nothing playing, or platform unsupported
    Idle,
    /// Watching the current track approach its exit region
    Monitoring,
    /// A plan is queued on the scheduler
    Scheduled,
    /// Both engines live, crossfade running
    Transitioning,
    /// Handover done; re-planning suppressed briefly
    Cooldown,
}

/// Validating wrapper around the current state
#[derive(Debug)]
pub struct StateMachine {
    state: AutomixState,
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine {
    pub fn new() -> Self {
        Self {
            state: AutomixState::Idle,
        }
    }

    pub fn state(&self) -> AutomixState {
        self.state
    }

    /// Attempt a transition. Returns whether it was applied.
    pub fn transition(&mut self, to: AutomixState) -> bool {
        use AutomixState::*;
        let allowed = match (self.state, to) {
            (Idle, Monitoring) => true,
            (Monitoring, Idle) => true,
            (Monitoring, Scheduled) => true,
            (Monitoring, Transitioning) => true,
            (Scheduled, Transitioning) => true,
            (Scheduled, Monitoring) => true,
            (Transitioning, Monitoring) => true,
            (Transitioning, Cooldown) => true,
            (Cooldown, Monitoring) => true,
            (from, to) if from == to => false,
            _ => false,
        };
        if allowed {
            tracing::debug!("automix state {:?} -> {:?}", self.state, to);
            self.state = to;
        } else if self.state != to {
            tracing::trace!("refused automix state {:?} -> {:?}", self.state, to);
        }
        allowed
    }

    pub fn is(&self, state: AutomixState) -> bool {
        self.state == state
    }
}
