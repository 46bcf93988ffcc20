//! Analysis result schema
//!
//! These records are produced by the native analyser, cached as opaque
//! payloads, and consumed by the transition planner. They are immutable
//! once cached; the planner and the engine only ever borrow them.

use serde::{Deserialize, Serialize};

/// Current analysis schema version.
///
/// Cached entries carrying a different version are ignored and
/// re-analysed.
pub const ANALYSIS_VERSION: i32 = 13;

/// Musical key mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    Major,
    Minor,
}

/// Full (or head-only) analysis of a single audio file
///
/// Time positions are in seconds from the start of the file. Optional
/// positions are absent when the analysed window did not cover them
/// (head analyses never carry tail positions) or when detection failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    /// Schema version; entries with a mismatched version are discarded
    pub version: i32,

    /// How many seconds of audio were analysed
    pub analyze_window: f64,

    /// Total track duration in seconds
    pub duration: f64,

    pub bpm: Option<f64>,
    /// Confidence of the BPM estimate (0-1)
    pub bpm_confidence: Option<f64>,
    /// Position of the first detected beat
    pub first_beat_pos: Option<f64>,

    /// Key root as a pitch class (0-11, C = 0)
    pub key_root: Option<i32>,
    pub key_mode: Option<KeyMode>,
    pub key_confidence: Option<f64>,
    /// Camelot wheel notation, e.g. "8A"
    pub camelot_key: Option<String>,

    /// Integrated loudness in LUFS (negative)
    pub loudness: Option<f64>,

    /// Where perceptible audio starts
    pub fade_in_pos: f64,
    /// Where perceptible audio ends
    pub fade_out_pos: f64,

    /// Tighter entry boundary suitable for hard cuts
    pub cut_in_pos: Option<f64>,
    /// Tighter exit boundary suitable for hard cuts
    pub cut_out_pos: Option<f64>,

    pub vocal_in_pos: Option<f64>,
    pub vocal_out_pos: Option<f64>,
    pub vocal_last_in_pos: Option<f64>,

    /// Chorus/drop start, if detected
    pub drop_pos: Option<f64>,
    pub mix_start_pos: Option<f64>,
    pub mix_center_pos: Option<f64>,
    pub mix_end_pos: Option<f64>,

    /// RMS level of the last active stretch of the outro, in dB
    pub outro_energy_level: Option<f64>,

    /// Coarse RMS energy curve over the analysed regions
    #[serde(default)]
    pub energy_profile: Option<Vec<f64>>,
}

impl AudioAnalysis {
    /// Whether this analysis was produced with the current schema version
    pub fn is_current_version(&self) -> bool {
        self.version == ANALYSIS_VERSION
    }

    /// Iterate the energy profile, if one was captured.
    ///
    /// The returned iterator is finite and can be obtained again for a
    /// fresh pass.
    pub fn energy_profile(&self) -> impl Iterator<Item = f64> + '_ {
        self.energy_profile.iter().flatten().copied()
    }

    /// Enforce the position-ordering invariant on optional fields.
    ///
    /// The chain `fade_in <= cut_in <= vocal_in <= vocal_out <= cut_out
    /// <= duration` must hold for whichever optional fields are present.
    /// A field that breaks the chain is dropped; the rest of the record
    /// survives. Required fade positions are clamped into
    /// `[0, duration]` instead.
    ///
    /// `cut_out_pos` is deliberately not bounded by `fade_out_pos`: the
    /// smart cut point regularly lands a little past the perceptible
    /// fade and the exit-point selection relies on that.
    ///
    /// Applied on the cache read path so that a corrupt or stale payload
    /// cannot feed impossible positions into the planner.
    pub fn sanitized(mut self) -> Self {
        self.fade_in_pos = self.fade_in_pos.clamp(0.0, self.duration);
        self.fade_out_pos = self.fade_out_pos.clamp(0.0, self.duration);

        let upper = self.duration;
        let mut lower = self.fade_in_pos;

        for field in [
            &mut self.cut_in_pos,
            &mut self.vocal_in_pos,
            &mut self.vocal_out_pos,
            &mut self.cut_out_pos,
        ] {
            if let Some(v) = *field {
                if v < lower || v > upper {
                    *field = None;
                } else {
                    lower = v;
                }
            }
        }

        // vocal_last_in sits between fade_in and vocal_out
        if let (Some(last_in), Some(out)) = (self.vocal_last_in_pos, self.vocal_out_pos) {
            if last_in < self.fade_in_pos || last_in > out {
                self.vocal_last_in_pos = None;
            }
        }

        self
    }
}

/// Transition style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MixType {
    /// Plain opposing-gain crossfade
    #[default]
    Default,

    /// Outgoing bass is high-passed out while incoming bass is let in,
    /// so low frequencies never overlap
    BassSwap,
}

impl MixType {
    /// Derive the mix type from an analyser strategy string.
    ///
    /// The analyser marks bass-region swaps by including "Bass Swap" in
    /// its strategy description.
    pub fn from_strategy(strategy: &str) -> Self {
        if strategy.contains("Bass Swap") {
            MixType::BassSwap
        } else {
            MixType::Default
        }
    }
}

/// Short mix suggestion from the analyser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionProposal {
    /// Suggested crossfade duration in seconds
    pub duration: f64,
    /// Where in the current track the mix should begin
    pub current_track_mix_out: f64,
    /// Where in the next track playback should enter
    pub next_track_mix_in: f64,

    pub mix_type: MixType,
    /// Human-readable filter plan, e.g. "Bass Swap / LPF"
    pub filter_strategy: String,

    /// Overall pairing quality (0-1)
    pub compatibility_score: f64,
    pub key_compatible: bool,
    pub bpm_compatible: bool,
}

/// One automation breakpoint inside an advanced transition
///
/// `time` is an offset in seconds from the start of the crossfade. Each
/// optional carries a target for one automatable parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationPoint {
    pub time: f64,
    /// Linear gain target (0-1)
    pub gain: Option<f64>,
    /// High-pass cutoff target in Hz
    pub filter_hz: Option<f64>,
    /// Filter resonance target
    pub q: Option<f64>,
}

/// Long "mashup" plan from the analyser
///
/// Unlike a [`TransitionProposal`] this carries full automation curves
/// for both tracks and may retune the incoming track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedTransition {
    /// When (in the current track) the overlay begins
    pub start_time_current: f64,
    /// Where (in the next track) playback enters
    pub start_time_next: f64,
    /// Overlay length in seconds
    pub duration: f64,

    pub pitch_shift_semitones: f64,
    /// Rate applied to the incoming track, typically 0.97-1.03
    pub playback_rate: f64,

    pub automation_current: Vec<AutomationPoint>,
    pub automation_next: Vec<AutomationPoint>,

    /// Strategy description; contains "Bass Swap" iff the bass region
    /// is to be swapped
    pub strategy: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_analysis() -> AudioAnalysis {
        AudioAnalysis {
            version: ANALYSIS_VERSION,
            analyze_window: 60.0,
            duration: 180.0,
            bpm: Some(128.0),
            bpm_confidence: Some(0.8),
            first_beat_pos: Some(0.2),
            key_root: Some(7),
            key_mode: Some(KeyMode::Minor),
            key_confidence: Some(0.8),
            camelot_key: Some("6A".to_string()),
            loudness: Some(-9.5),
            fade_in_pos: 1.0,
            fade_out_pos: 175.0,
            cut_in_pos: Some(4.0),
            cut_out_pos: Some(172.0),
            vocal_in_pos: Some(12.0),
            vocal_out_pos: Some(160.0),
            vocal_last_in_pos: Some(155.0),
            drop_pos: Some(33.0),
            mix_start_pos: Some(150.0),
            mix_center_pos: Some(165.0),
            mix_end_pos: Some(175.0),
            outro_energy_level: Some(-14.0),
            energy_profile: Some(vec![0.1, 0.5, 0.4]),
        }
    }

    #[test]
    fn sanitize_keeps_consistent_record() {
        let a = base_analysis();
        let s = a.clone().sanitized();
        assert_eq!(a, s);
    }

    #[test]
    fn sanitize_drops_out_of_order_field() {
        let mut a = base_analysis();
        // vocal_out before vocal_in breaks the chain
        a.vocal_out_pos = Some(8.0);
        let s = a.sanitized();
        assert_eq!(s.vocal_out_pos, None);
        // neighbours survive
        assert_eq!(s.vocal_in_pos, Some(12.0));
        assert_eq!(s.cut_out_pos, Some(172.0));
    }

    #[test]
    fn sanitize_drops_field_past_duration() {
        let mut a = base_analysis();
        a.cut_out_pos = Some(190.0); // past duration at 180
        let s = a.sanitized();
        assert_eq!(s.cut_out_pos, None);
    }

    #[test]
    fn sanitize_keeps_cut_out_past_fade_out() {
        let mut a = base_analysis();
        a.cut_out_pos = Some(176.0); // past fade_out at 175, still in range
        let s = a.sanitized();
        assert_eq!(s.cut_out_pos, Some(176.0));
    }

    #[test]
    fn sanitize_clamps_required_fades() {
        let mut a = base_analysis();
        a.fade_out_pos = 400.0;
        let s = a.sanitized();
        assert_eq!(s.fade_out_pos, 180.0);
    }

    #[test]
    fn sanitize_drops_vocal_last_in_after_vocal_out() {
        let mut a = base_analysis();
        a.vocal_last_in_pos = Some(165.0); // after vocal_out at 160
        let s = a.sanitized();
        assert_eq!(s.vocal_last_in_pos, None);
    }

    #[test]
    fn mix_type_from_strategy() {
        assert_eq!(MixType::from_strategy("Long Bass Swap"), MixType::BassSwap);
        assert_eq!(
            MixType::from_strategy("Bass Swap+Mashup"),
            MixType::BassSwap
        );
        assert_eq!(MixType::from_strategy("Eq Mixing"), MixType::Default);
        assert_eq!(MixType::from_strategy(""), MixType::Default);
    }

    #[test]
    fn energy_profile_iterator_restarts() {
        let a = base_analysis();
        let first: Vec<f64> = a.energy_profile().collect();
        let second: Vec<f64> = a.energy_profile().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);

        let mut empty = base_analysis();
        empty.energy_profile = None;
        assert_eq!(empty.energy_profile().count(), 0);
    }

    #[test]
    fn analysis_round_trips_through_json() {
        let a = base_analysis();
        let json = serde_json::to_string(&a).unwrap();
        let back: AudioAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(a, back);
    }

    #[test]
    fn missing_energy_profile_defaults_to_none() {
        // Older payloads may omit the field entirely
        let mut value = serde_json::to_value(base_analysis()).unwrap();
        value.as_object_mut().unwrap().remove("energy_profile");
        let back: AudioAnalysis = serde_json::from_value(value).unwrap();
        assert_eq!(back.energy_profile, None);
    }
}
