//! Transition planner
//!
//! Stateless: takes the two analyses plus whatever the analyser
//! suggested for the pair, and reduces them to a single executable
//! [`TransitionPlan`]. `None` means "cannot plan yet, keep monitoring".
//!
//! Strategy precedence:
//! 1. Mashup (`AdvancedTransition`) - copied verbatim
//! 2. Native proposal (`TransitionProposal`) - clamped into the track
//! 3. Fallback - exit point from the current analysis, snapped to bar
//!
//! BPM alignment and the aggressive-outro rewrite then refine the
//! non-mashup strategies, and a final safety clamp holds for all three.

use crate::error::{AutomixError, Result};
use nocturne_core::analysis::{
    AdvancedTransition, AudioAnalysis, MixType, TransitionProposal,
};
use nocturne_core::beat::{beat_index, round_up_to_bar, seconds_per_beat, snap_to_bar};
use nocturne_core::plan::TransitionPlan;
use nocturne_core::track::TrackRef;

/// Default crossfade length for the fallback strategy, in seconds
pub const DEFAULT_FADE_SECS: f64 = 8.0;

/// A crossfade never shrinks below this
pub const MIN_FADE_SECS: f64 = 0.5;

/// Bar snapping is reverted when it leaves less than this much track
const MIN_SNAP_HEADROOM_SECS: f64 = 4.0;

/// BPM confidence required before rate-matching
const BPM_CONFIDENCE_MIN: f64 = 0.4;

/// Rate-match only within this ratio band (inclusive)
const RATE_RATIO_MIN: f64 = 0.97;
const RATE_RATIO_MAX: f64 = 1.03;

/// An outro louder than this counts as high-energy, in dB
const HIGH_ENERGY_DB: f64 = -12.0;

/// Aggressive outro applies only when the sung part ends this many
/// seconds before the exit point
const OUTRO_MIN_TAIL_SECS: f64 = 8.0;

/// Beats to wait after the last vocal before cutting in; high-energy
/// outros additionally land on the next bar line
const HIGH_ENERGY_WAIT_BEATS: i64 = 4;
const QUIET_WAIT_BEATS: i64 = 1;

/// Everything the planner looks at for one boundary
pub struct PlanRequest<'a> {
    pub current: &'a AudioAnalysis,
    /// Whether `current` is a full analysis (covers the tail). Head
    /// analyses never trigger the aggressive-outro rewrite.
    pub current_is_full: bool,
    pub next: &'a AudioAnalysis,
    pub proposal: Option<&'a TransitionProposal>,
    pub advanced: Option<&'a AdvancedTransition>,
    /// Session token captured into the plan
    pub token: u64,
    pub next_track: &'a TrackRef,
    pub next_index: usize,
}

/// Produce a plan for the boundary, or `None` when no valid transition
/// exists. Deterministic: identical inputs yield identical plans.
pub fn plan(request: &PlanRequest<'_>) -> Option<TransitionPlan> {
    build(request).ok()
}

/// Like [`plan`], but reports why planning failed
pub fn build(request: &PlanRequest<'_>) -> Result<TransitionPlan> {
    // Strategy precedence: mashup, native proposal, fallback
    if let Some(advanced) = request.advanced {
        return finalize(mashup(advanced, request), request);
    }

    let mut draft = match request.proposal.filter(|p| p.duration > MIN_FADE_SECS) {
        Some(proposal) => from_proposal(proposal, request),
        None => fallback(request)?,
    };

    draft.initial_rate = bpm_alignment(request.current, request.next).unwrap_or(1.0);
    draft.playback_rate = draft.initial_rate;

    aggressive_outro(&mut draft, request);

    finalize(draft, request)
}

/// Strategy A: copy the analyser's mashup plan verbatim
fn mashup(advanced: &AdvancedTransition, request: &PlanRequest<'_>) -> TransitionPlan {
    TransitionPlan {
        token: request.token,
        next_track: request.next_track.clone(),
        next_index: request.next_index,
        trigger_time: advanced.start_time_current,
        crossfade_duration: advanced.duration,
        start_seek_ms: to_millis(advanced.start_time_next),
        initial_rate: advanced.playback_rate,
        ui_switch_delay: advanced.duration * 0.5,
        mix_type: MixType::from_strategy(&advanced.strategy),
        pitch_shift: advanced.pitch_shift_semitones,
        playback_rate: advanced.playback_rate,
        automation_current: advanced.automation_current.clone(),
        automation_next: advanced.automation_next.clone(),
    }
}

/// Strategy B: the analyser's short-mix proposal, clamped into the
/// current track
fn from_proposal(proposal: &TransitionProposal, request: &PlanRequest<'_>) -> TransitionPlan {
    let current = request.current;
    let trigger_time = proposal
        .current_track_mix_out
        .min(current.duration - 1.0);
    let crossfade_duration = proposal.duration.min(current.duration - trigger_time);

    TransitionPlan {
        token: request.token,
        next_track: request.next_track.clone(),
        next_index: request.next_index,
        trigger_time,
        crossfade_duration,
        start_seek_ms: to_millis(proposal.next_track_mix_in),
        initial_rate: 1.0,
        ui_switch_delay: 0.0,
        mix_type: MixType::from_strategy(&proposal.filter_strategy),
        pitch_shift: 0.0,
        playback_rate: 1.0,
        automation_current: Vec::new(),
        automation_next: Vec::new(),
    }
}

/// Strategy C: derive an exit point from the current analysis and back
/// off one default fade, snapped to the current track's bar grid
fn fallback(request: &PlanRequest<'_>) -> Result<TransitionPlan> {
    let current = request.current;
    let next = request.next;

    let exit = exit_point(current);
    let raw_trigger = exit - DEFAULT_FADE_SECS;

    let mut trigger_time = raw_trigger;
    if let (Some(bpm), Some(first_beat), Some(_)) =
        (current.bpm, current.first_beat_pos, next.bpm)
    {
        let snapped = snap_to_bar(raw_trigger, bpm, first_beat);
        // Preserve fade length over bar alignment near the track end
        if current.duration - snapped >= MIN_SNAP_HEADROOM_SECS {
            trigger_time = snapped;
        }
    }

    Ok(TransitionPlan {
        token: request.token,
        next_track: request.next_track.clone(),
        next_index: request.next_index,
        trigger_time,
        crossfade_duration: DEFAULT_FADE_SECS,
        start_seek_ms: to_millis(next.fade_in_pos.max(0.0)),
        initial_rate: 1.0,
        ui_switch_delay: 0.0,
        mix_type: MixType::Default,
        pitch_shift: 0.0,
        playback_rate: 1.0,
        automation_current: Vec::new(),
        automation_next: Vec::new(),
    })
}

/// Where the current track effectively ends.
///
/// Starts from the perceptible fade-out, discards it when vocals run
/// past it, and prefers the smart cut point when it bounds a
/// long-enough region and does not truncate vocals.
pub fn exit_point(current: &AudioAnalysis) -> f64 {
    let mut exit = current.fade_out_pos.min(current.duration);

    if let Some(vocal_out) = current.vocal_out_pos {
        if current.fade_out_pos < vocal_out - 0.1 {
            exit = current.duration;
        }
    }

    if let Some(cut_out) = current.cut_out_pos {
        let anchor = current.cut_in_pos.unwrap_or(current.fade_in_pos);
        let vocals_ok = current
            .vocal_out_pos
            .map_or(true, |vocal_out| cut_out >= vocal_out - 0.1);
        if cut_out > 0.0
            && cut_out <= current.duration
            && cut_out - anchor > 30.0
            && vocals_ok
        {
            exit = cut_out;
        }
    }

    exit
}

/// Rate-match the incoming track when both tempos are trustworthy and
/// close. The band is inclusive at both ends.
fn bpm_alignment(current: &AudioAnalysis, next: &AudioAnalysis) -> Option<f64> {
    let (bpm_current, bpm_next) = (current.bpm?, next.bpm?);
    if current.bpm_confidence? <= BPM_CONFIDENCE_MIN || next.bpm_confidence? <= BPM_CONFIDENCE_MIN {
        return None;
    }
    let ratio = bpm_current / bpm_next;
    if (RATE_RATIO_MIN..=RATE_RATIO_MAX).contains(&ratio) {
        Some(ratio)
    } else {
        None
    }
}

/// Pull the trigger forward onto the end of the vocals when the track
/// trails off into a long outro.
///
/// Only full analyses know where vocals end, so head analyses never
/// take this path. High-energy outros wait a few beats and land on a
/// bar line; quiet outros cut in a beat after the last vocal.
fn aggressive_outro(draft: &mut TransitionPlan, request: &PlanRequest<'_>) {
    if !request.current_is_full {
        return;
    }
    let current = request.current;
    let Some(vocal_out) = current.vocal_out_pos else {
        return;
    };

    let exit = exit_point(current);
    let tail = exit - vocal_out;
    if tail <= OUTRO_MIN_TAIL_SECS {
        return;
    }

    let high_energy = current
        .outro_energy_level
        .is_some_and(|level| level > HIGH_ENERGY_DB);

    let new_trigger = match (current.bpm, current.first_beat_pos) {
        (Some(bpm), Some(first_beat)) => {
            let vocal_beat = beat_index(vocal_out, bpm, first_beat);
            let target = if high_energy {
                round_up_to_bar(vocal_beat + HIGH_ENERGY_WAIT_BEATS)
            } else {
                vocal_beat + QUIET_WAIT_BEATS
            };
            first_beat + target as f64 * seconds_per_beat(bpm)
        }
        _ => vocal_out + if high_energy { 4.0 } else { 0.5 },
    };

    // Only ever move the trigger earlier, and keep a second of outro
    if new_trigger < draft.trigger_time && new_trigger <= exit - 1.0 {
        draft.trigger_time = new_trigger;
        let cap = if high_energy { 8.0 } else { 5.0 };
        draft.crossfade_duration = draft
            .crossfade_duration
            .min(cap)
            .min(exit - new_trigger);
    }
}

/// Safety clamp applied to every strategy's output
fn finalize(mut plan: TransitionPlan, request: &PlanRequest<'_>) -> Result<TransitionPlan> {
    let current = request.current;

    if plan.trigger_time < 0.0 {
        return Err(AutomixError::PlanRejected(format!(
            "trigger {:.2}s before track start",
            plan.trigger_time
        )));
    }

    // The entry point must lie inside the next track
    let seek_secs = plan.start_seek_ms as f64 / 1000.0;
    if seek_secs > request.next.duration {
        return Err(AutomixError::PlanRejected(format!(
            "start seek {:.2}s past next track end {:.2}s",
            seek_secs, request.next.duration
        )));
    }

    if plan.trigger_time + plan.crossfade_duration > current.duration {
        let available = current.duration - plan.trigger_time;
        if available < MIN_FADE_SECS {
            return Err(AutomixError::PlanRejected(format!(
                "only {:.2}s of track left after trigger",
                available
            )));
        }
        plan.crossfade_duration = available;
    }
    plan.crossfade_duration = plan.crossfade_duration.max(MIN_FADE_SECS);

    // A clamp above may have shrunk the fade past a copied switch point
    if plan.ui_switch_delay == 0.0 || plan.ui_switch_delay > plan.crossfade_duration {
        plan.ui_switch_delay = plan.crossfade_duration * 0.5;
    }

    Ok(plan)
}

fn to_millis(seconds: f64) -> u64 {
    (seconds.max(0.0) * 1000.0).round() as u64
}
