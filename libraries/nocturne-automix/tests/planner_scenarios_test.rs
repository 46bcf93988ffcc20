//! End-to-end planner scenarios
//!
//! Each test feeds the planner literal analysis values and checks the
//! exact plan that comes out, covering all three strategies, bar
//! snapping, the aggressive-outro rewrite, and BPM alignment.

use nocturne_automix::gain;
use nocturne_automix::planner::{plan, PlanRequest};
use nocturne_automix::testing::{analysis, track_ref};
use nocturne_core::analysis::{
    AdvancedTransition, AudioAnalysis, AutomationPoint, MixType, TransitionProposal,
};
use nocturne_core::TrackRef;

fn request<'a>(
    current: &'a AudioAnalysis,
    next: &'a AudioAnalysis,
    next_track: &'a TrackRef,
) -> PlanRequest<'a> {
    PlanRequest {
        current,
        current_is_full: true,
        next,
        proposal: None,
        advanced: None,
        token: 7,
        next_track,
        next_index: 3,
    }
}

/// Clean bar-aligned fallback: no analyser suggestions, snap the
/// default 8s fade onto the 128 BPM grid.
#[test]
fn clean_bar_aligned_fallback() {
    let mut current = analysis(180.0);
    current.bpm = Some(128.0);
    current.first_beat_pos = Some(0.0);
    current.fade_out_pos = 175.0;
    current.vocal_out_pos = Some(170.0);
    current.cut_out_pos = Some(176.0);
    current.cut_in_pos = Some(4.0);
    current.fade_in_pos = 2.0;
    current.loudness = Some(-9.0);

    let mut next = analysis(200.0);
    next.bpm = Some(128.0);
    next.fade_in_pos = 5.0;
    next.loudness = Some(-9.0);

    let track = track_ref("next", 200_000);
    let plan = plan(&request(&current, &next, &track)).expect("fallback plan");

    // exit point is the smart cut at 176; raw trigger 168 snaps to the
    // nearest bar (1.875s at 128 BPM) = 168.75
    assert!((plan.trigger_time - 168.75).abs() < 1e-9);
    assert_eq!(plan.crossfade_duration, 8.0);
    assert_eq!(plan.start_seek_ms, 5000);
    assert_eq!(plan.initial_rate, 1.0);
    assert_eq!(plan.mix_type, MixType::Default);
    assert_eq!(plan.token, 7);
    assert_eq!(plan.next_index, 3);
    assert_eq!(plan.ui_switch_delay, 4.0);

    // equal loudness: unity mix gain
    let mix = gain::mix_gain(current.loudness, next.loudness, 1.0, None);
    assert!((mix.linear - 1.0).abs() < 1e-9);
}

/// High-energy aggressive outro: the vocals end at 180 into a loud 55s
/// outro, so the trigger is pulled from 227 up to the bar line after
/// the last vocal.
#[test]
fn aggressive_outro_high_energy() {
    let mut current = analysis(240.0);
    current.bpm = Some(120.0);
    current.first_beat_pos = Some(0.0);
    current.fade_out_pos = 235.0;
    current.vocal_out_pos = Some(180.0);
    current.outro_energy_level = Some(-8.0);
    current.cut_out_pos = Some(235.0);

    let next = analysis(200.0);
    let track = track_ref("next", 200_000);
    let plan = plan(&request(&current, &next, &track)).expect("outro plan");

    // vocal-out beat 360 at 0.5s/beat; wait to the bar line at beat
    // 364 -> 182.0s. High-energy cap keeps the full 8s fade.
    assert!((plan.trigger_time - 182.0).abs() < 1e-9);
    assert_eq!(plan.crossfade_duration, 8.0);
}

/// A mashup plan from the analyser wins over everything and is copied
/// verbatim.
#[test]
fn mashup_strategy_wins() {
    let current = analysis(180.0);
    let next = analysis(240.0);
    let track = track_ref("next", 240_000);

    let advanced = AdvancedTransition {
        start_time_current: 100.0,
        start_time_next: 30.0,
        duration: 16.0,
        pitch_shift_semitones: -1.0,
        playback_rate: 0.98,
        automation_current: vec![AutomationPoint {
            time: 0.0,
            gain: Some(1.0),
            filter_hz: None,
            q: None,
        }],
        automation_next: vec![
            AutomationPoint {
                time: 0.0,
                gain: Some(0.0),
                filter_hz: Some(400.0),
                q: None,
            },
            AutomationPoint {
                time: 16.0,
                gain: Some(1.0),
                filter_hz: Some(10.0),
                q: None,
            },
        ],
        strategy: "Bass Swap+Mashup".to_string(),
    };

    let mut req = request(&current, &next, &track);
    req.advanced = Some(&advanced);
    // a proposal is also on offer but must lose
    let proposal = TransitionProposal {
        duration: 8.0,
        current_track_mix_out: 170.0,
        next_track_mix_in: 0.0,
        mix_type: MixType::Default,
        filter_strategy: String::new(),
        compatibility_score: 0.5,
        key_compatible: false,
        bpm_compatible: false,
    };
    req.proposal = Some(&proposal);

    let plan = plan(&req).expect("mashup plan");
    assert_eq!(plan.trigger_time, 100.0);
    assert_eq!(plan.crossfade_duration, 16.0);
    assert_eq!(plan.start_seek_ms, 30_000);
    assert_eq!(plan.initial_rate, 0.98);
    assert_eq!(plan.playback_rate, 0.98);
    assert_eq!(plan.pitch_shift, -1.0);
    assert_eq!(plan.ui_switch_delay, 8.0);
    assert_eq!(plan.mix_type, MixType::BassSwap);
    assert_eq!(plan.automation_current, advanced.automation_current);
    assert_eq!(plan.automation_next, advanced.automation_next);
}

/// Nearby tempos with confident detection get rate-matched; 128 vs 130
/// BPM is inside the band.
#[test]
fn bpm_alignment_applies_within_band() {
    let mut current = analysis(180.0);
    current.bpm = Some(128.0);
    current.bpm_confidence = Some(0.8);
    current.first_beat_pos = Some(0.0);
    current.fade_out_pos = 176.0;

    let mut next = analysis(200.0);
    next.bpm = Some(130.0);
    next.bpm_confidence = Some(0.8);

    let track = track_ref("next", 200_000);
    let plan = plan(&request(&current, &next, &track)).expect("plan");

    let expected = 128.0 / 130.0;
    assert!((plan.initial_rate - expected).abs() < 1e-9);
    assert!((plan.playback_rate - expected).abs() < 1e-9);
}

/// Distant tempos play at their own speed
#[test]
fn bpm_alignment_skipped_outside_band() {
    let mut current = analysis(180.0);
    current.bpm = Some(128.0);
    current.bpm_confidence = Some(0.8);
    current.fade_out_pos = 176.0;

    let mut next = analysis(200.0);
    next.bpm = Some(140.0);
    next.bpm_confidence = Some(0.8);

    let track = track_ref("next", 200_000);
    let plan = plan(&request(&current, &next, &track)).expect("plan");
    assert_eq!(plan.initial_rate, 1.0);
}

/// A proposal drives the plan when no mashup is available
#[test]
fn proposal_strategy_produces_bass_swap() {
    let mut current = analysis(300.0);
    current.fade_out_pos = 295.0;
    let mut next = analysis(280.0);
    next.fade_in_pos = 1.0;
    let track = track_ref("next", 280_000);

    let proposal = TransitionProposal {
        duration: 16.0,
        current_track_mix_out: 270.0,
        next_track_mix_in: 8.0,
        mix_type: MixType::BassSwap,
        filter_strategy: "Bass Swap / LPF".to_string(),
        compatibility_score: 0.9,
        key_compatible: true,
        bpm_compatible: true,
    };

    let mut req = request(&current, &next, &track);
    req.proposal = Some(&proposal);
    let plan = plan(&req).expect("proposal plan");

    assert_eq!(plan.trigger_time, 270.0);
    assert_eq!(plan.crossfade_duration, 16.0);
    assert_eq!(plan.start_seek_ms, 8_000);
    assert_eq!(plan.mix_type, MixType::BassSwap);
    assert_eq!(plan.ui_switch_delay, 8.0);
    assert!(plan.automation_current.is_empty());
    assert!(plan.automation_next.is_empty());
}
