//! Executable transition plan
//!
//! The planner reduces two analyses plus the live playback position to
//! one of these; the AutoMix engine executes it verbatim.

use crate::analysis::{AutomationPoint, MixType};
use crate::track::TrackRef;
use serde::{Deserialize, Serialize};

/// A fully resolved crossfade between the current and the next track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionPlan {
    /// Session token captured at planning time; a stale token
    /// invalidates the plan at fire time
    pub token: u64,

    /// The track this plan transitions into
    pub next_track: TrackRef,
    /// Queue index of the next track
    pub next_index: usize,

    /// When (in the current track's timeline) the crossfade begins
    pub trigger_time: f64,
    /// Crossfade length in seconds, never below 0.5
    pub crossfade_duration: f64,

    /// Entry point into the next track, in milliseconds
    pub start_seek_ms: u64,

    /// Rate applied to the incoming engine at start (1.0 unless the
    /// tracks were BPM-aligned)
    pub initial_rate: f64,

    /// Offset into the crossfade at which the logical "now playing"
    /// flips to the next track
    pub ui_switch_delay: f64,

    pub mix_type: MixType,

    /// Semitone retune of the incoming track (mashup plans only)
    pub pitch_shift: f64,
    /// Sustained playback rate of the incoming track
    pub playback_rate: f64,

    /// Automation for the outgoing engine, offsets relative to
    /// `trigger_time`
    pub automation_current: Vec<AutomationPoint>,
    /// Automation for the incoming engine
    pub automation_next: Vec<AutomationPoint>,
}

impl TransitionPlan {
    /// When the crossfade ends, in the current track's timeline
    pub fn fade_end(&self) -> f64 {
        self.trigger_time + self.crossfade_duration
    }

    /// Absolute time of the UI commit point
    pub fn ui_switch_time(&self) -> f64 {
        self.trigger_time + self.ui_switch_delay
    }

    /// Whether the plan carries analyser-authored automation curves
    pub fn has_automation(&self) -> bool {
        !self.automation_current.is_empty() || !self.automation_next.is_empty()
    }
}
