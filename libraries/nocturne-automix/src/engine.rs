//! Playback engine contract
//!
//! Abstracts the concrete audio backend behind a trait so the AutoMix
//! engine can drive two of them through a crossfade without knowing
//! anything about decoding or output devices. Implementors plug their
//! processed chain into the shared master bus; the per-engine gain
//! stage is what the crossfade automates.

use crate::error::{AutomixError, Result};
use nocturne_core::FadeCurve;
use serde::{Deserialize, Serialize};

/// Optional backend capabilities
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineCapabilities {
    /// Playback rate can be changed (required for BPM alignment)
    pub rate: bool,
    /// A 10-band EQ is present in the processed chain
    pub equalizer: bool,
    /// Spectrum analysis taps are available
    pub spectrum: bool,
    /// Output device can be selected per engine
    pub sink: bool,
}

/// Parameters for starting playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlayRequest {
    pub url: String,
    pub auto_play: bool,
    /// Initial seek position in seconds
    pub seek: Option<f64>,
    pub fade_in: bool,
    pub fade_duration: f64,
    pub fade_curve: FadeCurve,
}

impl PlayRequest {
    /// Start immediately from the beginning, no fade
    pub fn immediate(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            auto_play: true,
            seek: None,
            fade_in: false,
            fade_duration: 0.0,
            fade_curve: FadeCurve::EqualPower,
        }
    }

    /// Start immediately at an offset, no fade
    pub fn seeked(url: impl Into<String>, seek: f64) -> Self {
        Self {
            seek: Some(seek),
            ..Self::immediate(url)
        }
    }
}

/// Parameters for pausing playback
#[derive(Debug, Clone, PartialEq)]
pub struct PauseRequest {
    pub fade_out: bool,
    pub fade_duration: f64,
    pub fade_curve: FadeCurve,
    /// Keep the audio context alive so resuming is glitch-free
    pub keep_context_running: bool,
}

impl Default for PauseRequest {
    fn default() -> Self {
        Self {
            fade_out: false,
            fade_duration: 0.0,
            fade_curve: FadeCurve::EqualPower,
            keep_context_running: true,
        }
    }
}

/// Events emitted by a playback engine, delivered in per-engine order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EngineEvent {
    Play,
    Pause,
    Ended,
    Error { code: i32, message: String },
    CanPlay,
    LoadStart,
    Seeking,
    Seeked,
    Waiting,
    Playing,
    TimeUpdate { position: f64 },
    DurationChange { duration: f64 },
}

impl EngineEvent {
    /// Terminal events that must be masked from a retiring engine
    /// while a crossfade is in progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::Pause | EngineEvent::Ended | EngineEvent::Error { .. }
        )
    }
}

/// One playback engine: a decoder/source, its processed chain (bass-swap
/// filters, EQ, analyser taps), and a gain stage into the master bus.
///
/// Scheduled setters (`*_at`, `ramp_*_to_at`) take absolute times on
/// the shared audio output clock, the same clock the scheduler reads.
pub trait PlaybackEngine: Send {
    fn play(&mut self, request: PlayRequest) -> Result<()>;
    fn pause(&mut self, request: PauseRequest) -> Result<()>;
    /// Resume after a pause with the context kept running
    fn resume(&mut self) -> Result<()> {
        Ok(())
    }
    fn seek(&mut self, position: f64) -> Result<()>;
    fn stop(&mut self);

    /// Current gain of the per-engine stage (0-1)
    fn volume(&self) -> f64;
    fn set_volume(&mut self, gain: f64);
    /// Anchor the gain at an exact clock time; used to pre-arm ramps
    fn set_volume_at(&mut self, gain: f64, when: f64);
    fn ramp_volume_to(&mut self, target: f64, duration: f64, curve: FadeCurve);
    /// Linear ramp finishing at an exact clock time
    fn ramp_volume_to_at(&mut self, target: f64, when: f64);

    fn set_replay_gain(&mut self, linear: f64);

    /// Change playback rate. Default errs for engines without the
    /// capability.
    fn set_rate(&mut self, _rate: f64) -> Result<()> {
        Err(AutomixError::Unsupported("rate"))
    }

    fn set_high_pass(&mut self, hz: f64, ramp_secs: f64);
    fn set_high_pass_q(&mut self, q: f64);
    fn set_high_pass_at(&mut self, hz: f64, when: f64);
    fn ramp_high_pass_to_at(&mut self, hz: f64, when: f64);

    fn set_low_pass(&mut self, hz: f64, ramp_secs: f64);
    fn set_low_pass_q(&mut self, q: f64);
    fn set_low_pass_at(&mut self, hz: f64, when: f64);
    fn ramp_low_pass_to_at(&mut self, hz: f64, when: f64);

    /// Route this engine to a specific output device. Default errs for
    /// engines without the capability.
    fn set_sink(&mut self, _device_id: &str) -> Result<()> {
        Err(AutomixError::Unsupported("sink"))
    }

    fn capabilities(&self) -> EngineCapabilities;

    /// Playback position in seconds
    fn position(&self) -> f64;
    /// Track duration in seconds (0 when unknown)
    fn duration(&self) -> f64;

    /// Drain events accumulated since the last poll, in the order they
    /// occurred on this engine
    fn poll_events(&mut self) -> Vec<EngineEvent>;
}

/// Creates engines on the shared output graph
///
/// The AutoMix engine instantiates a second engine at the start of a
/// crossfade and tears the old one down afterwards; both plug into the
/// same master bus the factory wires up.
pub trait EngineFactory: Send + Sync {
    fn create(&self) -> Result<Box<dyn PlaybackEngine>>;
}
