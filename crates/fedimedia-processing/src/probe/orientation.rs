//! EXIF-style orientation values and their reconciliation with rotation metadata.

use crate::{ProcessingError, ProcessingResult};

pub const NORMAL: u8 = 1;

/// Validate a raw orientation tag. 0 means "unspecified" and maps to normal.
pub fn from_tag(tag: i64) -> ProcessingResult<u8> {
    match tag {
        0 => Ok(NORMAL),
        1..=8 => Ok(tag as u8),
        other => Err(ProcessingError::InvalidOrientation(other)),
    }
}

/// Map display-matrix rotation (degrees, counter-clockwise positive as
/// ffprobe reports it) to an orientation value. Rounded to the nearest 90.
pub fn from_rotation(degrees: f64) -> u8 {
    let quarter_turns = (degrees / 90.0).round() as i64;
    match (quarter_turns * 90).rem_euclid(360) {
        90 => 8,
        180 => 3,
        270 => 6,
        _ => NORMAL,
    }
}

/// Combine a tag orientation with side-data rotation. Both present and
/// disagreeing is an error.
pub fn reconcile(tag: Option<i64>, rotation: Option<f64>) -> ProcessingResult<u8> {
    let from_tag = tag.map(from_tag).transpose()?;
    let from_rot = rotation.map(from_rotation);
    match (from_tag, from_rot) {
        (Some(t), Some(r)) if t != r => Err(ProcessingError::OrientationConflict),
        (Some(t), _) => Ok(t),
        (None, Some(r)) => Ok(r),
        (None, None) => Ok(NORMAL),
    }
}

/// Orientations 5..=8 transpose the image.
pub fn swaps_dimensions(orientation: u8) -> bool {
    matches!(orientation, 5..=8)
}

/// Rotation (clockwise degrees) then flips needed to display an image
/// upright: `(rotate, flip_horizontal, flip_vertical)`.
pub fn transforms(orientation: u8) -> (Option<u16>, bool, bool) {
    match orientation {
        2 => (None, true, false),
        3 => (Some(180), false, false),
        4 => (None, false, true),
        5 => (Some(90), true, false),
        6 => (Some(90), false, false),
        7 => (Some(270), true, false),
        8 => (Some(270), false, false),
        _ => (None, false, false),
    }
}
