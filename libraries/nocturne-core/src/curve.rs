//! Fade curves for volume automation
//!
//! Three curve types cover the configuration surface:
//! - Linear: simple ramp (note: has a 3dB power dip at the midpoint of
//!   a crossfade)
//! - Exponential: slow start, fast finish; natural for filter-heavy mixes
//! - Equal Power: constant perceived loudness (best for music, default)

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Volume automation curve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FadeCurve {
    /// Linear fade: simple and predictable
    ///
    /// A linear crossfade keeps constant amplitude sum but not constant
    /// power, so the junction dips by 3dB at the midpoint. Prefer
    /// `EqualPower` for music.
    Linear,

    /// Exponential fade: t squared, rising slowly then fast
    Exponential,

    /// Equal power fade: maintains perceived loudness across the whole
    /// crossfade. This is the default.
    #[default]
    EqualPower,
}

impl FadeCurve {
    /// Calculate the fade gain at a given position
    ///
    /// # Arguments
    /// * `position` - Normalized position in the fade (0.0 to 1.0)
    /// * `fade_out` - If true, calculates fade-out gain; if false, fade-in gain
    ///
    /// # Returns
    /// Gain multiplier (0.0 to 1.0)
    #[inline]
    pub fn gain_at(&self, position: f64, fade_out: bool) -> f64 {
        let position = position.clamp(0.0, 1.0);
        let t = if fade_out { 1.0 - position } else { position };

        match self {
            FadeCurve::Linear => t,

            FadeCurve::Exponential => t * t,

            FadeCurve::EqualPower => {
                // sin^2(x) + cos^2(x) = 1, so the summed power of the
                // two sides of a crossfade stays constant
                (t * PI * 0.5).sin()
            }
        }
    }

    /// Get a human-readable name for the curve
    pub fn display_name(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "Linear",
            FadeCurve::Exponential => "Exponential",
            FadeCurve::EqualPower => "Equal Power",
        }
    }
}
