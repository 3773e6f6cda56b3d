#![allow(dead_code)]

pub mod lfo;
pub mod smoothed;

// -------------------------------------------------------------------------------------------------

/// Compute equal-power stereo gain factors for a panning position in range \[-1, 1\].
///
/// Returns a `(left, right)` gain pair on the quarter circle, so
/// `left² + right² == 1` and perceived loudness stays constant as a source
/// moves across the stereo field.
#[inline]
pub fn panning_factors(panning: f32) -> (f32, f32) {
    debug_assert!((-1.0..=1.0).contains(&panning), "Invalid panning factor");
    let angle = (panning + 1.0) * 0.25 * std::f32::consts::PI;
    (angle.cos(), angle.sin())
}

// -------------------------------------------------------------------------------------------------
