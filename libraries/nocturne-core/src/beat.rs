//! Beat-grid math
//!
//! A bar is four beats. All positions are seconds; grids are anchored
//! on the first detected beat of a track.

/// Seconds per beat at the given tempo
#[inline]
pub fn seconds_per_beat(bpm: f64) -> f64 {
    60.0 / bpm
}

/// Seconds per bar (4 beats) at the given tempo
#[inline]
pub fn seconds_per_bar(bpm: f64) -> f64 {
    240.0 / bpm
}

/// Snap a time instant to the nearest bar boundary of a beat grid.
///
/// Returns `time` unchanged for non-positive tempos. A snap before the
/// grid anchor collapses onto the anchor.
pub fn snap_to_bar(time: f64, bpm: f64, first_beat: f64) -> f64 {
    if bpm <= 0.0 {
        return time;
    }
    let bar = seconds_per_bar(bpm);
    let bars = (time - first_beat) / bar;
    let snapped = first_beat + bars.round() * bar;
    if snapped < 0.0 {
        first_beat
    } else {
        snapped
    }
}

/// Beat index of a time instant on a grid, rounding up when the
/// position has nearly reached the next beat.
///
/// Positions within the last 10% of a beat count as the next beat, so
/// that automation landing a hair early still aligns.
pub fn beat_index(time: f64, bpm: f64, first_beat: f64) -> i64 {
    let beat = seconds_per_beat(bpm);
    let pos = (time - first_beat) / beat;
    let index = pos.floor();
    if pos - index > 0.9 {
        index as i64 + 1
    } else {
        index as i64
    }
}

/// Round a beat index up to the next bar line (multiple of 4).
///
/// An index already on a bar line is returned unchanged.
pub fn round_up_to_bar(beat: i64) -> i64 {
    beat + (4 - beat.rem_euclid(4)) % 4
}
