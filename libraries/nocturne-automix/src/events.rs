//! AutoMix events
//!
//! Emitted at the points the UI cares about and drained from the main
//! loop. AutoMix has no error surface of its own: failures degrade to a
//! hard cut, which is just another event here.

use crate::state::AutomixState;
use nocturne_core::analysis::MixType;
use serde::{Deserialize, Serialize};

/// Events emitted by the AutoMix engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AutomixEvent {
    /// Lifecycle state changed
    StateChanged {
        from: AutomixState,
        to: AutomixState,
    },

    /// A transition was queued on the scheduler
    TransitionScheduled {
        trigger_time: f64,
        crossfade_duration: f64,
        mix_type: MixType,
    },

    /// The crossfade began; both engines are live
    TransitionStarted {
        crossfade_duration: f64,
        mix_type: MixType,
        initial_rate: f64,
    },

    /// The logical "now playing" flipped to the next track
    UiSwitched {
        track_id: String,
        next_index: usize,
    },

    /// Crossfade finished and the old engine was torn down
    TransitionCompleted,

    /// A running or queued transition was abandoned
    TransitionAborted { reason: String },

    /// The current track ended with no transition planned; the player
    /// should advance with a plain cut
    HardCut { track_id: Option<String> },
}
