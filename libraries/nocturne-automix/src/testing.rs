//! Test doubles for the AutoMix engine
//!
//! A manually driven clock, a fully scripted playback engine that
//! records every call, and a canned analyser. Shared by this crate's
//! own tests and usable by downstream integration code that wants to
//! exercise AutoMix without real audio.

use crate::engine::{
    EngineCapabilities, EngineEvent, EngineFactory, PauseRequest, PlayRequest, PlaybackEngine,
};
use crate::error::{AutomixError, Result};
use crate::scheduler::AudioClock;
use nocturne_analysis::Analyser;
use nocturne_core::analysis::{
    AdvancedTransition, AudioAnalysis, TransitionProposal, ANALYSIS_VERSION,
};
use nocturne_core::{FadeCurve, TrackRef};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A clock advanced by hand
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn new(now: f64) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: f64) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, secs: f64) {
        *self.now.lock().unwrap() += secs;
    }
}

impl AudioClock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock().unwrap()
    }
}

/// Every call a [`MockEngine`] records
#[derive(Debug, Clone, PartialEq)]
pub enum EngineOp {
    Play { url: String, seek: Option<f64>, auto_play: bool },
    Pause,
    Resume,
    Seek(f64),
    Stop,
    SetVolume(f64),
    SetVolumeAt { gain: f64, when: f64 },
    RampVolume { target: f64, duration: f64, curve: FadeCurve },
    RampVolumeToAt { target: f64, when: f64 },
    SetReplayGain(f64),
    SetRate(f64),
    SetHighPass { hz: f64, ramp_secs: f64 },
    SetHighPassQ(f64),
    SetHighPassAt { hz: f64, when: f64 },
    RampHighPassToAt { hz: f64, when: f64 },
    SetLowPass { hz: f64, ramp_secs: f64 },
    SetLowPassQ(f64),
    SetLowPassAt { hz: f64, when: f64 },
    RampLowPassToAt { hz: f64, when: f64 },
    SetSink(String),
}

/// Observable state of a mock engine, shared with the test
#[derive(Debug)]
pub struct MockEngineState {
    pub volume: f64,
    pub rate: f64,
    pub replay_gain: f64,
    pub high_pass_hz: f64,
    pub high_pass_q: f64,
    pub playing: bool,
    pub stopped: bool,
    pub url: Option<String>,
    pub position: f64,
    pub duration: f64,
    pub capabilities: EngineCapabilities,
    /// Events the next `poll_events` will deliver
    pub queued_events: Vec<EngineEvent>,
    /// Everything that was called on this engine, in order
    pub ops: Vec<EngineOp>,
    /// Make the next `play` fail (for prime-failure paths)
    pub fail_play: bool,
}

impl Default for MockEngineState {
    fn default() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            replay_gain: 1.0,
            high_pass_hz: 10.0,
            high_pass_q: 0.707,
            playing: false,
            stopped: false,
            url: None,
            position: 0.0,
            duration: 0.0,
            capabilities: EngineCapabilities {
                rate: true,
                equalizer: true,
                spectrum: true,
                sink: false,
            },
            queued_events: Vec::new(),
            ops: Vec::new(),
            fail_play: false,
        }
    }
}

impl MockEngineState {
    /// Whether a particular op was recorded
    pub fn saw(&self, op: &EngineOp) -> bool {
        self.ops.contains(op)
    }
}

/// Scripted playback engine
pub struct MockEngine {
    state: Arc<Mutex<MockEngineState>>,
}

impl MockEngine {
    pub fn with_handle() -> (Self, Arc<Mutex<MockEngineState>>) {
        let state = Arc::new(Mutex::new(MockEngineState::default()));
        (
            Self {
                state: state.clone(),
            },
            state,
        )
    }

    fn record(&self, op: EngineOp) {
        self.state.lock().unwrap().ops.push(op);
    }
}

impl PlaybackEngine for MockEngine {
    fn play(&mut self, request: PlayRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::Play {
            url: request.url.clone(),
            seek: request.seek,
            auto_play: request.auto_play,
        });
        if state.fail_play {
            return Err(AutomixError::Engine("mock play failure".to_string()));
        }
        state.url = Some(request.url);
        state.playing = request.auto_play;
        if let Some(seek) = request.seek {
            state.position = seek;
        }
        Ok(())
    }

    fn pause(&mut self, _request: PauseRequest) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::Pause);
        state.playing = false;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::Resume);
        state.playing = true;
        Ok(())
    }

    fn seek(&mut self, position: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::Seek(position));
        state.position = position;
        Ok(())
    }

    fn stop(&mut self) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::Stop);
        state.playing = false;
        state.stopped = true;
    }

    fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    fn set_volume(&mut self, gain: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::SetVolume(gain));
        state.volume = gain;
    }

    fn set_volume_at(&mut self, gain: f64, when: f64) {
        self.record(EngineOp::SetVolumeAt { gain, when });
    }

    fn ramp_volume_to(&mut self, target: f64, duration: f64, curve: FadeCurve) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::RampVolume {
            target,
            duration,
            curve,
        });
        // the mock jumps straight to the target
        state.volume = target;
    }

    fn ramp_volume_to_at(&mut self, target: f64, when: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::RampVolumeToAt { target, when });
        state.volume = target;
    }

    fn set_replay_gain(&mut self, linear: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::SetReplayGain(linear));
        state.replay_gain = linear;
    }

    fn set_rate(&mut self, rate: f64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.capabilities.rate {
            return Err(AutomixError::Unsupported("rate"));
        }
        state.ops.push(EngineOp::SetRate(rate));
        state.rate = rate;
        Ok(())
    }

    fn set_high_pass(&mut self, hz: f64, ramp_secs: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::SetHighPass { hz, ramp_secs });
        state.high_pass_hz = hz;
    }

    fn set_high_pass_q(&mut self, q: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::SetHighPassQ(q));
        state.high_pass_q = q;
    }

    fn set_high_pass_at(&mut self, hz: f64, when: f64) {
        self.record(EngineOp::SetHighPassAt { hz, when });
    }

    fn ramp_high_pass_to_at(&mut self, hz: f64, when: f64) {
        let mut state = self.state.lock().unwrap();
        state.ops.push(EngineOp::RampHighPassToAt { hz, when });
        state.high_pass_hz = hz;
    }

    fn set_low_pass(&mut self, hz: f64, ramp_secs: f64) {
        self.record(EngineOp::SetLowPass { hz, ramp_secs });
    }

    fn set_low_pass_q(&mut self, q: f64) {
        self.record(EngineOp::SetLowPassQ(q));
    }

    fn set_low_pass_at(&mut self, hz: f64, when: f64) {
        self.record(EngineOp::SetLowPassAt { hz, when });
    }

    fn ramp_low_pass_to_at(&mut self, hz: f64, when: f64) {
        self.record(EngineOp::RampLowPassToAt { hz, when });
    }

    fn set_sink(&mut self, device_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.capabilities.sink {
            return Err(AutomixError::Unsupported("sink"));
        }
        state.ops.push(EngineOp::SetSink(device_id.to_string()));
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.state.lock().unwrap().capabilities
    }

    fn position(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.state.lock().unwrap().queued_events)
    }
}

/// Factory handing out [`MockEngine`]s and keeping their state handles
/// for inspection
#[derive(Default)]
pub struct MockFactory {
    created: Mutex<Vec<Arc<Mutex<MockEngineState>>>>,
    fail_next: Mutex<bool>,
    fail_play_next: Mutex<bool>,
    default_duration: Mutex<f64>,
}

impl MockFactory {
    pub fn new(default_duration: f64) -> Self {
        Self {
            created: Mutex::new(Vec::new()),
            fail_next: Mutex::new(false),
            fail_play_next: Mutex::new(false),
            default_duration: Mutex::new(default_duration),
        }
    }

    /// State handle of the n-th created engine
    pub fn engine(&self, index: usize) -> Arc<Mutex<MockEngineState>> {
        self.created.lock().unwrap()[index].clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn set_default_duration(&self, duration: f64) {
        *self.default_duration.lock().unwrap() = duration;
    }

    /// Make the next `create` call fail
    pub fn fail_next_create(&self) {
        *self.fail_next.lock().unwrap() = true;
    }

    /// Make the next created engine reject its `play`
    pub fn fail_next_play(&self) {
        *self.fail_play_next.lock().unwrap() = true;
    }
}

impl EngineFactory for Arc<MockFactory> {
    fn create(&self) -> Result<Box<dyn PlaybackEngine>> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(AutomixError::Engine("mock factory failure".to_string()));
        }
        let (engine, state) = MockEngine::with_handle();
        {
            let mut state = state.lock().unwrap();
            state.duration = *self.default_duration.lock().unwrap();
            state.fail_play = std::mem::take(&mut *self.fail_play_next.lock().unwrap());
        }
        self.created.lock().unwrap().push(state);
        Ok(Box::new(engine))
    }
}

/// Canned analyser for orchestration tests
#[derive(Default)]
pub struct StaticAnalyser {
    full: Mutex<HashMap<PathBuf, AudioAnalysis>>,
    head: Mutex<HashMap<PathBuf, AudioAnalysis>>,
    proposal: Mutex<Option<TransitionProposal>>,
    advanced: Mutex<Option<AdvancedTransition>>,
}

impl StaticAnalyser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_full(&self, path: impl Into<PathBuf>, analysis: AudioAnalysis) {
        self.full.lock().unwrap().insert(path.into(), analysis);
    }

    pub fn set_head(&self, path: impl Into<PathBuf>, analysis: AudioAnalysis) {
        self.head.lock().unwrap().insert(path.into(), analysis);
    }

    pub fn set_proposal(&self, proposal: Option<TransitionProposal>) {
        *self.proposal.lock().unwrap() = proposal;
    }

    pub fn set_advanced(&self, advanced: Option<AdvancedTransition>) {
        *self.advanced.lock().unwrap() = advanced;
    }
}

impl Analyser for StaticAnalyser {
    fn analyze(&self, path: &Path, _max_window: f64) -> Option<AudioAnalysis> {
        self.full.lock().unwrap().get(path).cloned()
    }

    fn analyze_head(&self, path: &Path, _max_window: f64) -> Option<AudioAnalysis> {
        self.head.lock().unwrap().get(path).cloned()
    }

    fn suggest_transition(&self, _c: &Path, _n: &Path) -> Option<TransitionProposal> {
        self.proposal.lock().unwrap().clone()
    }

    fn suggest_long_mix(&self, _c: &Path, _n: &Path) -> Option<AdvancedTransition> {
        self.advanced.lock().unwrap().clone()
    }
}

/// Minimal analysis with everything optional absent
pub fn analysis(duration: f64) -> AudioAnalysis {
    AudioAnalysis {
        version: ANALYSIS_VERSION,
        analyze_window: 60.0,
        duration,
        bpm: None,
        bpm_confidence: None,
        first_beat_pos: None,
        key_root: None,
        key_mode: None,
        key_confidence: None,
        camelot_key: None,
        loudness: None,
        fade_in_pos: 0.0,
        fade_out_pos: duration,
        cut_in_pos: None,
        cut_out_pos: None,
        vocal_in_pos: None,
        vocal_out_pos: None,
        vocal_last_in_pos: None,
        drop_pos: None,
        mix_start_pos: None,
        mix_center_pos: None,
        mix_end_pos: None,
        outro_energy_level: None,
        energy_profile: None,
    }
}

/// Track descriptor with a synthetic library path
pub fn track_ref(id: &str, duration_ms: u64) -> TrackRef {
    TrackRef {
        id: id.to_string(),
        path: Some(PathBuf::from(format!("/music/{}.flac", id))),
        duration_ms,
        replay_gain: None,
    }
}
