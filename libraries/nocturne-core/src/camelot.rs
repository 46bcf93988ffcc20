//! Camelot wheel helpers for harmonic mixing
//!
//! The Camelot wheel maps musical keys onto positions 1-12 with an "A"
//! (minor) and "B" (major) ring. Adjacent positions in the same ring
//! mix cleanly.

use crate::analysis::KeyMode;

/// Wheel positions indexed by pitch class (C = 0), major ring
const MAJOR_WHEEL: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];
/// Wheel positions indexed by pitch class, minor ring
const MINOR_WHEEL: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

/// Camelot notation for a detected key, e.g. C major -> "8B",
/// A minor -> "8A".
pub fn camelot_key(root: i32, mode: KeyMode) -> Option<String> {
    let root = usize::try_from(root).ok()?;
    let (wheel, ring) = match mode {
        KeyMode::Major => (&MAJOR_WHEEL, 'B'),
        KeyMode::Minor => (&MINOR_WHEEL, 'A'),
    };
    let number = wheel.get(root)?;
    Some(format!("{}{}", number, ring))
}

fn parse(key: &str) -> Option<(i32, char)> {
    let ring = key.chars().last()?;
    if ring != 'A' && ring != 'B' {
        return None;
    }
    let number: i32 = key[..key.len() - 1].parse().ok()?;
    if (1..=12).contains(&number) {
        Some((number, ring))
    } else {
        None
    }
}

/// Whether two Camelot keys are harmonically compatible.
///
/// Identical keys always mix; otherwise the keys must sit on adjacent
/// wheel positions (wrapping 12 -> 1) in the same ring. Unknown or
/// malformed keys are treated as incompatible.
pub fn camelot_compatible(a: Option<&str>, b: Option<&str>) -> bool {
    let (Some(a), Some(b)) = (a, b) else {
        return false;
    };
    if a == b {
        return true;
    }
    let (Some((na, ra)), Some((nb, rb))) = (parse(a), parse(b)) else {
        return false;
    };
    let diff = (na - nb).abs();
    (diff == 1 || diff == 11) && ra == rb
}
