//! Engine parameters and the LFO modulation target table.

use std::ops::RangeInclusive;

use crate::{utils::lfo::LfoShape, Error};

// -------------------------------------------------------------------------------------------------

// Parameter value ranges. Modulated values are clamped to these after the LFO
// offset is applied; the control surface clamps incoming parameter records to
// the same ranges as a safety net.

/// Grain duration in seconds.
pub const GRAIN_SIZE_RANGE: RangeInclusive<f32> = 0.01..=0.5;
/// Period between grain spawns in seconds.
pub const DENSITY_RANGE: RangeInclusive<f32> = 0.005..=0.5;
/// Random grain start offset, as a multiplier on half the buffer length.
pub const SPREAD_RANGE: RangeInclusive<f32> = 0.0..=2.0;
/// Normalized playhead position.
pub const POSITION_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Probability that a grain plays reversed.
pub const REVERSAL_CHANCE_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Stereo pan center (-1 = full left, +1 = full right).
pub const PAN_RANGE: RangeInclusive<f32> = -1.0..=1.0;
/// Half range of per grain uniform pan jitter.
pub const PAN_SPREAD_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Pitch shift in semitones.
pub const PITCH_RANGE: RangeInclusive<f32> = -24.0..=24.0;
/// Random detune half range in cents.
pub const DETUNE_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// FM carrier frequency in Hz.
pub const FM_FREQ_RANGE: RangeInclusive<f32> = 0.0..=1000.0;
/// FM amount, in 0.01 playback rate deviation units.
pub const FM_AMOUNT_RANGE: RangeInclusive<f32> = 0.0..=100.0;
/// Attack stage, as a fraction of the grain duration.
pub const ATTACK_RANGE: RangeInclusive<f32> = 0.01..=0.9;
/// Release stage, as a fraction of the grain duration.
pub const RELEASE_RANGE: RangeInclusive<f32> = 0.01..=0.9;
/// LFO rate in Hz.
pub const LFO_RATE_RANGE: RangeInclusive<f32> = 0.1..=20.0;
/// LFO modulation depth.
pub const LFO_AMOUNT_RANGE: RangeInclusive<f32> = 0.0..=1.0;
/// Master output gain.
pub const VOLUME_RANGE: RangeInclusive<f32> = 0.0..=1.0;

// Effect chain pass-through ranges. The engine does not interpret these, but
// the LFO target table below modulates a subset, so the clamp bounds are part
// of the shared control contract.

pub const FILTER_FREQ_RANGE: RangeInclusive<f32> = 20.0..=20000.0;
pub const FILTER_RES_RANGE: RangeInclusive<f32> = 0.0..=10.0;
pub const DIST_AMOUNT_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const DELAY_TIME_RANGE: RangeInclusive<f32> = 0.01..=2.0;
pub const DELAY_FEEDBACK_RANGE: RangeInclusive<f32> = 0.0..=0.95;
pub const DELAY_MIX_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const REVERB_MIX_RANGE: RangeInclusive<f32> = 0.0..=1.0;
pub const REVERB_DECAY_RANGE: RangeInclusive<f32> = 0.1..=10.0;

// -------------------------------------------------------------------------------------------------

/// Parameters the LFO can modulate.
///
/// Discriminants are the stable bit positions of the modulation target mask
/// and are part of the control contract: UI consumers building masks must use
/// the same positions, scales and clamp ranges.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, strum::Display, strum::EnumString, strum::VariantNames,
)]
#[repr(u32)]
pub enum LfoTarget {
    GrainSize = 0,
    Density = 1,
    Spread = 2,
    Position = 3,
    Pitch = 4,
    FmFreq = 5,
    FmAmount = 6,
    FilterFreq = 7,
    FilterRes = 8,
    Attack = 9,
    Release = 10,
    DistAmount = 11,
    DelayMix = 12,
    DelayTime = 13,
    DelayFeedback = 14,
    Pan = 15,
    PanSpread = 16,
}

/// Mask with every modulation target bit set.
pub const ALL_LFO_TARGETS_MASK: u32 = (1 << 17) - 1;

impl LfoTarget {
    /// Bit mask flag for this target.
    #[inline]
    pub const fn bit(self) -> u32 {
        1 << self as u32
    }

    /// Maximum value swing the LFO adds to this target at full depth.
    pub const fn modulation_scale(self) -> f32 {
        match self {
            Self::GrainSize => 0.2,
            Self::Density => 0.1,
            Self::Spread => 1.0,
            Self::Position => 0.5,
            Self::Pitch => 24.0,
            Self::FmFreq => 200.0,
            Self::FmAmount => 50.0,
            Self::FilterFreq => 5000.0,
            Self::FilterRes => 10.0,
            Self::Attack => 0.5,
            Self::Release => 0.5,
            Self::DistAmount => 0.5,
            Self::DelayMix => 0.5,
            Self::DelayTime => 0.5,
            Self::DelayFeedback => 0.5,
            Self::Pan => 1.0,
            Self::PanSpread => 1.0,
        }
    }

    /// Clamp range applied to modulated values of this target.
    pub const fn clamp_range(self) -> RangeInclusive<f32> {
        match self {
            Self::GrainSize => GRAIN_SIZE_RANGE,
            Self::Density => DENSITY_RANGE,
            Self::Spread => SPREAD_RANGE,
            Self::Position => POSITION_RANGE,
            Self::Pitch => PITCH_RANGE,
            Self::FmFreq => FM_FREQ_RANGE,
            Self::FmAmount => FM_AMOUNT_RANGE,
            Self::FilterFreq => FILTER_FREQ_RANGE,
            Self::FilterRes => FILTER_RES_RANGE,
            Self::Attack => ATTACK_RANGE,
            Self::Release => RELEASE_RANGE,
            Self::DistAmount => DIST_AMOUNT_RANGE,
            Self::DelayMix => DELAY_MIX_RANGE,
            Self::DelayTime => DELAY_TIME_RANGE,
            Self::DelayFeedback => DELAY_FEEDBACK_RANGE,
            Self::Pan => PAN_RANGE,
            Self::PanSpread => PAN_SPREAD_RANGE,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// Apply LFO modulation to a parameter's base value.
///
/// When the target's bit is set in `mask`, the LFO value scaled by `depth` and
/// the target's modulation scale is added and the result is clamped to the
/// target's range. Otherwise the base value passes through unchanged.
#[inline]
pub fn modulated(base: f32, target: LfoTarget, mask: u32, lfo: f32, depth: f32) -> f32 {
    if mask & target.bit() == 0 {
        return base;
    }
    let range = target.clamp_range();
    (base + lfo * depth * target.modulation_scale()).clamp(*range.start(), *range.end())
}

// -------------------------------------------------------------------------------------------------

/// Envelope curve applied to grain attack and release stages.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, strum::Display, strum::EnumString,
    strum::VariantNames,
)]
#[repr(u8)]
pub enum EnvelopeCurve {
    /// Linear ramps.
    #[default]
    Linear,
    /// Quadratic ramps, a cheap approximation of exponential curves.
    Exponential,
}

// -------------------------------------------------------------------------------------------------

/// Flat set of engine parameters, replaced atomically via the controller.
///
/// The effect chain fields at the bottom are pass-through values: the engine
/// carries and clamps them but leaves their interpretation to the external
/// effect cascade.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineParameters {
    /// Grain duration in seconds.
    pub grain_size: f32,
    /// Period between grain spawns in seconds.
    pub density: f32,
    /// Random grain start offset, as a multiplier on half the buffer length.
    pub spread: f32,
    /// Normalized playhead position.
    pub position: f32,
    /// Probability that a grain plays reversed.
    pub grain_reversal_chance: f32,
    /// Stereo pan center.
    pub pan: f32,
    /// Half range of per grain uniform pan jitter.
    pub pan_spread: f32,
    /// Pitch shift in semitones.
    pub pitch: f32,
    /// Random detune half range in cents.
    pub detune: f32,
    /// FM carrier frequency in Hz.
    pub fm_freq: f32,
    /// FM amount, in 0.01 playback rate deviation units.
    pub fm_amount: f32,
    /// Attack stage as a fraction of the grain duration.
    pub attack: f32,
    /// Release stage as a fraction of the grain duration.
    pub release: f32,
    /// Envelope curve for the attack and release stages.
    pub envelope_curve: EnvelopeCurve,
    /// LFO rate in Hz.
    pub lfo_rate: f32,
    /// LFO modulation depth.
    pub lfo_amount: f32,
    /// LFO waveform shape.
    pub lfo_shape: LfoShape,
    /// Bit mask of modulated [`LfoTarget`]s.
    pub lfo_target_mask: u32,
    /// Master output gain. Smoothed by the engine and exposed for the external
    /// gain stage, but not applied to the grain mix.
    pub volume: f32,

    // Effect chain pass-through values.
    pub filter_freq: f32,
    pub filter_res: f32,
    pub dist_amount: f32,
    pub delay_time: f32,
    pub delay_feedback: f32,
    pub delay_mix: f32,
    pub reverb_mix: f32,
    pub reverb_decay: f32,
}

impl Default for EngineParameters {
    fn default() -> Self {
        Self {
            grain_size: 0.3,
            density: 0.15,
            spread: 0.0,
            position: 0.0,
            grain_reversal_chance: 0.0,
            pan: 0.0,
            pan_spread: 0.0,
            pitch: 0.0,
            detune: 0.0,
            fm_freq: 0.0,
            fm_amount: 0.0,
            attack: 0.5,
            release: 0.5,
            envelope_curve: EnvelopeCurve::Linear,
            lfo_rate: 1.0,
            lfo_amount: 0.0,
            lfo_shape: LfoShape::Sine,
            lfo_target_mask: 0,
            volume: 0.8,
            filter_freq: 20000.0,
            filter_res: 0.0,
            dist_amount: 0.0,
            delay_time: 0.3,
            delay_feedback: 0.3,
            delay_mix: 0.0,
            reverb_mix: 0.0,
            reverb_decay: 2.0,
        }
    }
}

impl EngineParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate all parameters. Returns `Error::ParameterError` for the first
    /// value outside its documented range.
    pub fn validate(&self) -> Result<(), Error> {
        fn check(name: &str, value: f32, range: &RangeInclusive<f32>) -> Result<(), Error> {
            if !range.contains(&value) || value.is_nan() {
                return Err(Error::ParameterError(format!(
                    "{name} must be between {} and {}, but is {value}",
                    range.start(),
                    range.end()
                )));
            }
            Ok(())
        }

        check("Grain size", self.grain_size, &GRAIN_SIZE_RANGE)?;
        check("Grain density", self.density, &DENSITY_RANGE)?;
        check("Grain spread", self.spread, &SPREAD_RANGE)?;
        check("Position", self.position, &POSITION_RANGE)?;
        check(
            "Grain reversal chance",
            self.grain_reversal_chance,
            &REVERSAL_CHANCE_RANGE,
        )?;
        check("Pan", self.pan, &PAN_RANGE)?;
        check("Pan spread", self.pan_spread, &PAN_SPREAD_RANGE)?;
        check("Pitch", self.pitch, &PITCH_RANGE)?;
        check("Detune", self.detune, &DETUNE_RANGE)?;
        check("FM frequency", self.fm_freq, &FM_FREQ_RANGE)?;
        check("FM amount", self.fm_amount, &FM_AMOUNT_RANGE)?;
        check("Attack", self.attack, &ATTACK_RANGE)?;
        check("Release", self.release, &RELEASE_RANGE)?;
        check("LFO rate", self.lfo_rate, &LFO_RATE_RANGE)?;
        check("LFO amount", self.lfo_amount, &LFO_AMOUNT_RANGE)?;
        check("Volume", self.volume, &VOLUME_RANGE)?;
        check("Filter frequency", self.filter_freq, &FILTER_FREQ_RANGE)?;
        check("Filter resonance", self.filter_res, &FILTER_RES_RANGE)?;
        check("Distortion amount", self.dist_amount, &DIST_AMOUNT_RANGE)?;
        check("Delay time", self.delay_time, &DELAY_TIME_RANGE)?;
        check("Delay feedback", self.delay_feedback, &DELAY_FEEDBACK_RANGE)?;
        check("Delay mix", self.delay_mix, &DELAY_MIX_RANGE)?;
        check("Reverb mix", self.reverb_mix, &REVERB_MIX_RANGE)?;
        check("Reverb decay", self.reverb_decay, &REVERB_DECAY_RANGE)?;

        if self.lfo_target_mask & !ALL_LFO_TARGETS_MASK != 0 {
            return Err(Error::ParameterError(format!(
                "LFO target mask contains unknown bits: {:#x}",
                self.lfo_target_mask
            )));
        }
        Ok(())
    }

    /// Return a copy with every value clamped to its documented range.
    pub fn clamped(&self) -> Self {
        fn clamp(value: f32, range: &RangeInclusive<f32>) -> f32 {
            value.clamp(*range.start(), *range.end())
        }

        Self {
            grain_size: clamp(self.grain_size, &GRAIN_SIZE_RANGE),
            density: clamp(self.density, &DENSITY_RANGE),
            spread: clamp(self.spread, &SPREAD_RANGE),
            position: clamp(self.position, &POSITION_RANGE),
            grain_reversal_chance: clamp(self.grain_reversal_chance, &REVERSAL_CHANCE_RANGE),
            pan: clamp(self.pan, &PAN_RANGE),
            pan_spread: clamp(self.pan_spread, &PAN_SPREAD_RANGE),
            pitch: clamp(self.pitch, &PITCH_RANGE),
            detune: clamp(self.detune, &DETUNE_RANGE),
            fm_freq: clamp(self.fm_freq, &FM_FREQ_RANGE),
            fm_amount: clamp(self.fm_amount, &FM_AMOUNT_RANGE),
            attack: clamp(self.attack, &ATTACK_RANGE),
            release: clamp(self.release, &RELEASE_RANGE),
            envelope_curve: self.envelope_curve,
            lfo_rate: clamp(self.lfo_rate, &LFO_RATE_RANGE),
            lfo_amount: clamp(self.lfo_amount, &LFO_AMOUNT_RANGE),
            lfo_shape: self.lfo_shape,
            lfo_target_mask: self.lfo_target_mask & ALL_LFO_TARGETS_MASK,
            volume: clamp(self.volume, &VOLUME_RANGE),
            filter_freq: clamp(self.filter_freq, &FILTER_FREQ_RANGE),
            filter_res: clamp(self.filter_res, &FILTER_RES_RANGE),
            dist_amount: clamp(self.dist_amount, &DIST_AMOUNT_RANGE),
            delay_time: clamp(self.delay_time, &DELAY_TIME_RANGE),
            delay_feedback: clamp(self.delay_feedback, &DELAY_FEEDBACK_RANGE),
            delay_mix: clamp(self.delay_mix, &DELAY_MIX_RANGE),
            reverb_mix: clamp(self.reverb_mix, &REVERB_MIX_RANGE),
            reverb_decay: clamp(self.reverb_decay, &REVERB_DECAY_RANGE),
        }
    }
}

// -------------------------------------------------------------------------------------------------
