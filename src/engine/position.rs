//! Grain read position control: manual parameter, freeze, and drift.

use rand::{rngs::SmallRng, Rng};

// -------------------------------------------------------------------------------------------------

/// Computes the base read position for newly spawned grains.
///
/// Mode priority is fixed: a frozen position always wins, drift wins over the
/// smoothed manual position parameter. Drift is a bounded random walk around a
/// base position with a restoring force pulling back towards it.
#[derive(Debug, Clone)]
pub(crate) struct PositionController {
    frozen: bool,
    frozen_position: f32,
    drifting: bool,
    drift_position: f32,
    drift_base: f32,
    drift_speed: f32,
    drift_return_tendency: f32,
}

impl PositionController {
    pub fn new() -> Self {
        Self {
            frozen: false,
            frozen_position: 0.0,
            drifting: false,
            drift_position: 0.5,
            drift_base: 0.5,
            drift_speed: 0.5,
            drift_return_tendency: 0.3,
        }
    }

    /// Freeze or unfreeze the position. Freezing captures the given position;
    /// unfreezing falls back to drift or the manual parameter.
    pub fn set_frozen(&mut self, frozen: bool, position: f32) {
        self.frozen = frozen;
        if frozen {
            self.frozen_position = position.clamp(0.0, 1.0);
        }
    }

    /// Enable or disable drifting. Enabling restarts the walk at the given
    /// base position.
    pub fn set_drift(&mut self, enabled: bool, base: f32, speed: f32, return_tendency: f32) {
        self.drifting = enabled;
        if enabled {
            self.drift_base = base.clamp(0.0, 1.0);
            self.drift_position = self.drift_base;
            self.drift_speed = speed.clamp(0.0, 1.0);
            self.drift_return_tendency = return_tendency.clamp(0.0, 1.0);
        }
    }

    #[cfg(test)]
    pub fn frozen_position(&self) -> f32 {
        self.frozen_position
    }

    #[cfg(test)]
    pub fn drift_position(&self) -> f32 {
        self.drift_position
    }

    /// Base position for the next grain spawn, given the smoothed manual
    /// position parameter.
    pub fn base_position(&self, manual_position: f32) -> f32 {
        if self.frozen {
            self.frozen_position
        } else if self.drifting {
            self.drift_position
        } else {
            manual_position
        }
    }

    /// Advance the drift random walk by one block of `delta_time` seconds.
    /// Drift is suppressed while frozen.
    pub fn update_drift(&mut self, delta_time: f32, rng: &mut SmallRng) {
        if !self.drifting || self.frozen {
            return;
        }
        let step_size = self.drift_speed * delta_time * 0.5;
        let random_step = (rng.random::<f32>() - 0.5) * 2.0 * step_size;
        let return_force =
            (self.drift_base - self.drift_position) * self.drift_return_tendency * delta_time * 0.5;
        self.drift_position = (self.drift_position + random_step + return_force).clamp(0.0, 1.0);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn mode_priority() {
        let mut position = PositionController::new();
        assert_eq!(position.base_position(0.25), 0.25);

        position.set_drift(true, 0.5, 1.0, 0.5);
        assert_eq!(position.base_position(0.25), 0.5);

        // Frozen wins over drift
        position.set_frozen(true, 0.75);
        assert_eq!(position.base_position(0.25), 0.75);

        position.set_frozen(false, 0.0);
        assert_eq!(position.base_position(0.25), 0.5);

        position.set_drift(false, 0.0, 0.0, 0.0);
        assert_eq!(position.base_position(0.25), 0.25);
    }

    #[test]
    fn freeze_captures_and_keeps_the_position() {
        let mut position = PositionController::new();
        position.set_frozen(true, 0.3);
        assert_eq!(position.frozen_position(), 0.3);

        // Unfreezing and refreezing at the same spot restores it
        position.set_frozen(false, 0.9);
        position.set_frozen(true, 0.3);
        assert_eq!(position.frozen_position(), 0.3);

        // Out of range capture positions are clamped
        position.set_frozen(true, 1.5);
        assert_eq!(position.frozen_position(), 1.0);
    }

    #[test]
    fn drift_is_suppressed_while_frozen() {
        let mut rng = SmallRng::seed_from_u64(1);
        let mut position = PositionController::new();
        position.set_drift(true, 0.5, 1.0, 0.5);
        position.set_frozen(true, 0.2);
        for _ in 0..100 {
            position.update_drift(0.01, &mut rng);
        }
        assert_eq!(position.drift_position(), 0.5);
    }

    #[test]
    fn drift_stays_bounded_around_its_base() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut position = PositionController::new();
        position.set_drift(true, 0.5, 1.0, 0.5);

        // Ten seconds of 128 frame blocks at 48 kHz
        let block_duration = 128.0 / 48000.0;
        let mut sum = 0.0f64;
        let blocks = 3750;
        for _ in 0..blocks {
            position.update_drift(block_duration, &mut rng);
            let drift = position.drift_position();
            assert!((0.0..=1.0).contains(&drift));
            sum += drift as f64;
        }
        let mean = sum / blocks as f64;
        assert!((mean - 0.5).abs() < 0.1, "Drift mean wandered to {mean}");
    }
}
