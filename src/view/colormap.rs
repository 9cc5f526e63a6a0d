//! Four-segment false-color gradient.
//!
//! A sample is first turned into a level in `0..=1024` relative to the observed
//! range, then inverted and mapped through four linear segments:
//!
//! | inverted level | red        | green       | blue        |
//! |----------------|------------|-------------|-------------|
//! | `0..256`       | 255        | 255 - l     | 0           |
//! | `256..512`     | 255        | 0           | l - 256     |
//! | `512..768`     | 255 - (l - 512) | 0      | 255         |
//! | `768..=1024`   | 0          | l - 768     | 255         |
//!
//! Green saturates at 255 for inverted level 1024.

use image::Rgb;

/// Highest level.
pub const MAX_LEVEL: i32 = 1024;

/// Color of cells without a sample.
pub const UNSET_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

// Every level precomputed once; lookups are a bounds clamp and an index.
static LEVEL_LUT: [[u8; 3]; MAX_LEVEL as usize + 1] = compute_lut();

const fn compute_lut() -> [[u8; 3]; MAX_LEVEL as usize + 1] {
    let mut lut = [[0u8; 3]; MAX_LEVEL as usize + 1];
    let mut level = 0;
    while level <= MAX_LEVEL {
        let inv = MAX_LEVEL - level;
        lut[level as usize] = if inv < 256 {
            [255, (255 - inv) as u8, 0]
        } else if inv < 512 {
            [255, 0, (inv - 256) as u8]
        } else if inv < 768 {
            [(255 - (inv - 512)) as u8, 0, 255]
        } else {
            let green = inv - 768;
            [0, if green > 255 { 255 } else { green as u8 }, 255]
        };
        level += 1;
    }
    lut
}

/// Level of `value` within `[tmin, tmax]`, truncated and clamped to `0..=1024`.
///
/// A degenerate range maps everything to level 0.
pub fn level_for(value: f32, tmin: f32, tmax: f32) -> i32 {
    if tmax <= tmin {
        return 0;
    }
    let level = (value - tmin) * MAX_LEVEL as f32 / (tmax - tmin);
    (level as i32).clamp(0, MAX_LEVEL)
}

/// Color for a level; out-of-range levels are clamped.
pub fn color_for_level(level: i32) -> Rgb<u8> {
    Rgb(LEVEL_LUT[level.clamp(0, MAX_LEVEL) as usize])
}

/// Color of a cell given the current range.
pub fn color_for(value: Option<f32>, range: Option<(f32, f32)>) -> Rgb<u8> {
    match (value, range) {
        (Some(value), Some((tmin, tmax))) => color_for_level(level_for(value, tmin, tmax)),
        _ => UNSET_COLOR,
    }
}
