//! Low frequency oscillator for parameter modulation.

use std::f32::consts::TAU;

// -------------------------------------------------------------------------------------------------

/// Waveform shapes for the modulation LFO.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, strum::Display, strum::EnumString,
    strum::VariantNames,
)]
#[repr(u8)]
pub enum LfoShape {
    #[default]
    Sine = 0,
    Triangle = 1,
    Square = 2,
    Sawtooth = 3,
}

// -------------------------------------------------------------------------------------------------

/// Simple non bandlimited oscillator, evaluated from absolute engine time.
///
/// Rates are sub audio (<= 20 Hz), so callers evaluate the oscillator once per
/// processed block at the block start time and reuse the value for the whole
/// block. All shapes produce values in range \[-1, 1\].
#[derive(Debug, Clone, Copy)]
pub struct Lfo {
    rate: f32,
    shape: LfoShape,
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new(1.0, LfoShape::Sine)
    }
}

impl Lfo {
    pub fn new(rate: f32, shape: LfoShape) -> Self {
        Self { rate, shape }
    }

    /// Set a new rate in Hz.
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    /// Set the waveform shape.
    pub fn set_shape(&mut self, shape: LfoShape) {
        self.shape = shape;
    }

    /// Evaluate the oscillator at the given time in seconds.
    pub fn value_at(&self, time: f64) -> f32 {
        let phase = (time * self.rate as f64).rem_euclid(1.0) as f32;
        match self.shape {
            LfoShape::Sine => (phase * TAU).sin(),
            LfoShape::Triangle => (phase * 4.0 - 2.0).abs() - 1.0,
            LfoShape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoShape::Sawtooth => phase * 2.0 - 1.0,
        }
    }
}

// -------------------------------------------------------------------------------------------------
