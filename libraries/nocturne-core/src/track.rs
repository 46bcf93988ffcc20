//! Track descriptors consumed by the planner and the engine pair

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// ReplayGain metadata read from a track's tags
///
/// Gains are in dB, peaks are linear sample peaks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplayGainInfo {
    pub track_gain_db: Option<f64>,
    pub album_gain_db: Option<f64>,
    pub track_peak: Option<f64>,
    pub album_peak: Option<f64>,
}

/// Minimal description of a queued track
///
/// The AutoMix engine never inspects audio bytes itself; everything it
/// needs beyond this descriptor comes from the analyser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRef {
    /// Stable identifier from the library
    pub id: String,

    /// Absolute filesystem path, when the track is local.
    /// Analysis is only possible for tracks with a path.
    pub path: Option<PathBuf>,

    pub duration_ms: u64,

    pub replay_gain: Option<ReplayGainInfo>,
}

impl TrackRef {
    /// Duration in seconds
    pub fn duration_secs(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }
}
