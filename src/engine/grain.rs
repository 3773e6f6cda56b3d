//! Grain records and the fixed capacity grain pool.

use crate::buffer::SampleBuffer;

// -------------------------------------------------------------------------------------------------

/// Fraction of the envelope phase reserved for the anti click fade in.
const FADE_RATIO: f32 = 0.01;
/// Floor value the fade in ramps to before the attack stage takes over.
const ENV_FLOOR: f32 = 0.001;

// -------------------------------------------------------------------------------------------------

/// A single grain's playback state. Plain data without heap references,
/// reused in place by the pool.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Grain {
    active: bool,
    /// Fractional read position in the sample buffer, in frames.
    read_pos: f32,
    /// Read position increment per output sample. Negative plays reversed.
    rate: f32,
    samples_remaining: i32,
    /// Envelope progress in range [0, 1].
    env_phase: f32,
    /// Per sample phase increment, the reciprocal of the total sample count.
    env_increment: f32,
    attack_ratio: f32,
    release_ratio: f32,
    exponential_env: bool,
    /// Pre computed equal power pan gains.
    pan_left: f32,
    pan_right: f32,
}

impl Default for Grain {
    fn default() -> Self {
        Self::new()
    }
}

impl Grain {
    /// Create a new inactive grain.
    pub const fn new() -> Self {
        Self {
            active: false,
            read_pos: 0.0,
            rate: 0.0,
            samples_remaining: 0,
            env_phase: 0.0,
            env_increment: 0.0,
            attack_ratio: 0.0,
            release_ratio: 0.0,
            exponential_env: false,
            pan_left: 0.0,
            pan_right: 0.0,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[cfg(test)]
    pub fn read_pos(&self) -> f32 {
        self.read_pos
    }

    #[cfg(test)]
    pub fn rate(&self) -> f32 {
        self.rate
    }

    #[inline]
    pub fn samples_remaining(&self) -> i32 {
        self.samples_remaining
    }

    /// Activate this grain with the given playback state.
    #[allow(clippy::too_many_arguments)]
    pub fn activate(
        &mut self,
        read_pos: f32,
        rate: f32,
        samples_total: i32,
        attack_ratio: f32,
        release_ratio: f32,
        exponential_env: bool,
        pan_left: f32,
        pan_right: f32,
    ) {
        debug_assert!(samples_total >= 1, "Grains need at least one sample");
        self.active = true;
        self.read_pos = read_pos;
        self.rate = rate;
        self.samples_remaining = samples_total;
        self.env_phase = 0.0;
        self.env_increment = 1.0 / samples_total as f32;
        self.attack_ratio = attack_ratio;
        self.release_ratio = release_ratio;
        self.exponential_env = exponential_env;
        self.pan_left = pan_left;
        self.pan_right = pan_right;
    }

    /// Deactivate this grain immediately.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.samples_remaining = 0;
    }

    /// Envelope value at the grain's current phase.
    ///
    /// The first percent of the phase always fades in linearly up to a small
    /// floor value to keep grain starts click free, regardless of the attack
    /// setting. Attack then scales the floor up to 1, sustain holds 1, and
    /// release scales back down to 0. When attack and release overlap the
    /// sustain stage is empty and attack hands off to release directly.
    pub fn envelope(&self) -> f32 {
        const EPSILON: f32 = 1e-6;

        let phase = self.env_phase;
        let attack_end = self.attack_ratio;
        let release_start = 1.0 - self.release_ratio;

        if phase < FADE_RATIO {
            phase / FADE_RATIO * ENV_FLOOR
        } else if phase < attack_end {
            let attack_duration = attack_end - FADE_RATIO;
            if attack_duration < EPSILON {
                return ENV_FLOOR;
            }
            let t = (phase - FADE_RATIO) / attack_duration;
            if self.exponential_env {
                ENV_FLOOR + t * t * (1.0 - ENV_FLOOR)
            } else {
                ENV_FLOOR + t * (1.0 - ENV_FLOOR)
            }
        } else if phase < release_start {
            1.0
        } else {
            // With overlapping attack and release the sustain stage is empty
            // and the release ramp starts right at the attack end, keeping the
            // envelope continuous there.
            let release_start = release_start.max(attack_end);
            let release_duration = 1.0 - release_start;
            if release_duration < EPSILON {
                return 0.0;
            }
            let t = ((phase - release_start) / release_duration).min(1.0);
            if self.exponential_env {
                let value = 1.0 - t;
                value * value
            } else {
                1.0 - t
            }
        }
    }

    /// Process this grain for one output sample: read the buffer, shape, pan,
    /// advance, and retire the grain at its end or at the buffer bounds.
    /// Returns the grain's (left, right) output contribution.
    #[inline]
    pub fn process(&mut self, buffer: &SampleBuffer) -> (f32, f32) {
        let sample = buffer.sample_at(self.read_pos) * self.envelope();

        self.read_pos += self.rate;
        self.env_phase += self.env_increment;
        self.samples_remaining -= 1;

        if self.samples_remaining <= 0
            || self.read_pos < 0.0
            || self.read_pos >= buffer.len() as f32
        {
            self.active = false;
        }

        (sample * self.pan_left, sample * self.pan_right)
    }
}

// -------------------------------------------------------------------------------------------------

/// Fixed pool of reusable grains mixed into the block output.
///
/// At most `POOL_SIZE` grains are active at once. Spawning prefers an inactive
/// slot; when the pool is full the grain closest to its end (the one with the
/// smallest remaining sample count) is recycled, which keeps the audible
/// truncation as short as possible.
pub(crate) struct GrainPool<const POOL_SIZE: usize> {
    grains: [Grain; POOL_SIZE],
}

impl<const POOL_SIZE: usize> GrainPool<POOL_SIZE> {
    pub const fn new() -> Self {
        Self {
            grains: [Grain::new(); POOL_SIZE],
        }
    }

    /// Number of currently active grains.
    pub fn active_count(&self) -> usize {
        self.grains.iter().filter(|grain| grain.is_active()).count()
    }

    /// Iterate over all grain slots.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Grain> {
        self.grains.iter()
    }

    /// Deactivate all grains.
    pub fn deactivate_all(&mut self) {
        for grain in &mut self.grains {
            grain.deactivate();
        }
    }

    /// Claim the slot for a new grain: the first inactive one, or with a fully
    /// active pool the grain with the least samples remaining.
    pub fn allocate(&mut self) -> &mut Grain {
        let mut steal_index = 0;
        let mut least_remaining = i32::MAX;
        for (index, grain) in self.grains.iter().enumerate() {
            if !grain.is_active() {
                return &mut self.grains[index];
            }
            if grain.samples_remaining() < least_remaining {
                least_remaining = grain.samples_remaining();
                steal_index = index;
            }
        }
        &mut self.grains[steal_index]
    }

    /// Sum the contributions of all active grains for one output sample.
    #[inline]
    pub fn process(&mut self, buffer: &SampleBuffer) -> (f32, f32) {
        let mut left = 0.0;
        let mut right = 0.0;
        for grain in &mut self.grains {
            if !grain.is_active() {
                continue;
            }
            let (grain_left, grain_right) = grain.process(buffer);
            left += grain_left;
            right += grain_right;
        }
        (left, right)
    }
}

// -------------------------------------------------------------------------------------------------
