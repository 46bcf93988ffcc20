//! Loudness matching and peak safety
//!
//! The incoming engine's pre-fade gain compensates for the loudness
//! difference between the two tracks, folds in the configured
//! ReplayGain, and is clamped so the incoming track's known peak can
//! never clip after the gain is applied.

use nocturne_core::{ReplayGainInfo, ReplayGainMode};

/// Loudness compensation is clamped to this many dB in either direction
pub const MAX_COMPENSATION_DB: f64 = 9.0;

/// Resolved pre-fade gain for the incoming engine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixGain {
    /// Loudness compensation actually applied, in dB (post-clamp)
    pub compensation_db: f64,
    /// Final linear gain: compensation x ReplayGain, peak-limited
    pub linear: f64,
    /// Whether the peak clamp reduced the gain
    pub peak_limited: bool,
}

/// dB to linear multiplier
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// The ReplayGain multiplier for a track under the configured mode.
/// Missing metadata means unity gain.
pub fn replay_gain_linear(mode: ReplayGainMode, info: Option<&ReplayGainInfo>) -> f64 {
    let gain_db = info.and_then(|i| match mode {
        ReplayGainMode::Track => i.track_gain_db.or(i.album_gain_db),
        ReplayGainMode::Album => i.album_gain_db.or(i.track_gain_db),
    });
    gain_db.map(db_to_linear).unwrap_or(1.0)
}

/// The peak to guard against under the configured mode, if known
pub fn peak_for_mode(mode: ReplayGainMode, info: Option<&ReplayGainInfo>) -> Option<f64> {
    info.and_then(|i| match mode {
        ReplayGainMode::Track => i.track_peak.or(i.album_peak),
        ReplayGainMode::Album => i.album_peak.or(i.track_peak),
    })
}

/// Compute the incoming engine's pre-fade gain.
///
/// `current_lufs`/`next_lufs` are integrated loudness values from the
/// analyses; a missing value disables compensation. `next_peak` absent
/// means no clamp.
pub fn mix_gain(
    current_lufs: Option<f64>,
    next_lufs: Option<f64>,
    replay_gain: f64,
    next_peak: Option<f64>,
) -> MixGain {
    let compensation_db = match (current_lufs, next_lufs) {
        (Some(current), Some(next)) => {
            (current - next).clamp(-MAX_COMPENSATION_DB, MAX_COMPENSATION_DB)
        }
        _ => 0.0,
    };

    let mut linear = db_to_linear(compensation_db) * replay_gain;
    let mut peak_limited = false;

    if let Some(peak) = next_peak {
        if peak > 0.0 && linear * peak > 1.0 {
            let reduced = 1.0 / peak;
            tracing::warn!(
                "mix gain {:.3} would clip at peak {:.3}; reduced to {:.3}",
                linear,
                peak,
                reduced
            );
            linear = reduced;
            peak_limited = true;
        }
    }

    MixGain {
        compensation_db,
        linear,
        peak_limited,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_loudness_is_unity() {
        let gain = mix_gain(Some(-9.0), Some(-9.0), 1.0, None);
        assert_eq!(gain.compensation_db, 0.0);
        assert!((gain.linear - 1.0).abs() < 1e-9);
        assert!(!gain.peak_limited);
    }

    #[test]
    fn quieter_next_track_is_boosted() {
        // current -8 LUFS, next -12 LUFS: next gets +4 dB
        let gain = mix_gain(Some(-8.0), Some(-12.0), 1.0, None);
        assert!((gain.compensation_db - 4.0).abs() < 1e-9);
        assert!((gain.linear - db_to_linear(4.0)).abs() < 1e-9);
    }

    #[test]
    fn compensation_clamps_at_nine_db() {
        let boost = mix_gain(Some(-5.0), Some(-25.0), 1.0, None);
        assert_eq!(boost.compensation_db, 9.0);

        let cut = mix_gain(Some(-25.0), Some(-5.0), 1.0, None);
        assert_eq!(cut.compensation_db, -9.0);
    }

    #[test]
    fn missing_loudness_disables_compensation() {
        assert_eq!(mix_gain(None, Some(-9.0), 1.0, None).compensation_db, 0.0);
        assert_eq!(mix_gain(Some(-9.0), None, 1.0, None).compensation_db, 0.0);
    }

    #[test]
    fn replay_gain_multiplies_in() {
        let rg = db_to_linear(-6.0);
        let gain = mix_gain(Some(-9.0), Some(-9.0), rg, None);
        assert!((gain.linear - rg).abs() < 1e-9);
    }

    #[test]
    fn peak_clamp_prevents_clipping() {
        // +6 dB boost against a 0.9 peak would clip
        let gain = mix_gain(Some(-6.0), Some(-12.0), 1.0, Some(0.9));
        assert!(gain.peak_limited);
        assert!((gain.linear - 1.0 / 0.9).abs() < 1e-9);
        assert!(gain.linear * 0.9 <= 1.0 + 1e-9);
    }

    #[test]
    fn absent_peak_means_no_clamp() {
        let gain = mix_gain(Some(-6.0), Some(-12.0), 1.0, None);
        assert!(!gain.peak_limited);
        assert!(gain.linear > 1.9); // +6 dB
    }

    #[test]
    fn replay_gain_mode_selection() {
        let info = ReplayGainInfo {
            track_gain_db: Some(-3.0),
            album_gain_db: Some(-1.0),
            track_peak: Some(0.8),
            album_peak: Some(0.95),
        };

        let track = replay_gain_linear(ReplayGainMode::Track, Some(&info));
        assert!((track - db_to_linear(-3.0)).abs() < 1e-9);

        let album = replay_gain_linear(ReplayGainMode::Album, Some(&info));
        assert!((album - db_to_linear(-1.0)).abs() < 1e-9);

        assert_eq!(peak_for_mode(ReplayGainMode::Track, Some(&info)), Some(0.8));
        assert_eq!(
            peak_for_mode(ReplayGainMode::Album, Some(&info)),
            Some(0.95)
        );
    }

    #[test]
    fn replay_gain_falls_back_across_modes() {
        let only_album = ReplayGainInfo {
            track_gain_db: None,
            album_gain_db: Some(-2.0),
            track_peak: None,
            album_peak: Some(0.9),
        };
        let gain = replay_gain_linear(ReplayGainMode::Track, Some(&only_album));
        assert!((gain - db_to_linear(-2.0)).abs() < 1e-9);
        assert_eq!(
            peak_for_mode(ReplayGainMode::Track, Some(&only_album)),
            Some(0.9)
        );

        assert_eq!(replay_gain_linear(ReplayGainMode::Track, None), 1.0);
        assert_eq!(peak_for_mode(ReplayGainMode::Album, None), None);
    }
}
