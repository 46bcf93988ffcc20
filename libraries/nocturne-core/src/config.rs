//! Process-global AutoMix configuration

use crate::curve::FadeCurve;
use serde::{Deserialize, Serialize};

/// Bounds for the analysis window, in seconds
pub const MIN_ANALYZE_TIME: u32 = 10;
pub const MAX_ANALYZE_TIME: u32 = 300;

/// Which ReplayGain value to apply during playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayGainMode {
    #[default]
    Track,
    Album,
}

/// Configuration for the AutoMix engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomixConfig {
    /// Master switch; when off the engine stays idle
    pub enabled: bool,

    /// Maximum seconds of audio the analyser may examine per track.
    /// Read through [`AutomixConfig::analyze_window`], which clamps.
    pub max_analyze_time: u32,

    pub replay_gain_mode: ReplayGainMode,

    pub fade_curve: FadeCurve,

    /// Whether this platform ships the native analyser.
    /// Without it the engine never leaves idle.
    pub analysis_supported: bool,
}

impl Default for AutomixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_analyze_time: 60,
            replay_gain_mode: ReplayGainMode::Track,
            fade_curve: FadeCurve::EqualPower,
            analysis_supported: true,
        }
    }
}

impl AutomixConfig {
    /// The configured analysis window, clamped to the supported range
    pub fn analyze_window(&self) -> f64 {
        self.max_analyze_time
            .clamp(MIN_ANALYZE_TIME, MAX_ANALYZE_TIME) as f64
    }

    /// How far before the end of the current track monitoring begins.
    ///
    /// Derived from the analysis window so that a transition can always
    /// be planned inside analysed audio, clamped to [30, 300] seconds.
    pub fn monitor_window(&self) -> f64 {
        self.analyze_window().clamp(30.0, 300.0)
    }
}
