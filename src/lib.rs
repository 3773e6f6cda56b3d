//! **granulate** is a real-time granular synthesis engine for Rust. It turns a
//! sample buffer and a time-varying parameter set into a stereo stream of
//! short, overlapping, windowed grains.
//!
//! ### Overview
//!
//! - **[`GrainEngine`]** is the realtime half: its `process` call renders one
//!   block of audio and is safe to run in an audio device callback. It
//!   schedules grain spawns sample accurately, mixes up to
//!   [`GRAIN_POOL_SIZE`] overlapping grains with pitch shifting, equal-power
//!   panning and click-free envelopes, and never allocates or blocks while
//!   processing.
//!
//! - **[`EngineController`]** is the control half, created together with the
//!   engine. Parameter updates, sample buffer swaps, transport and
//!   freeze/drift commands travel through bounded lock-free queues and are
//!   applied by the engine at block boundaries. Retired sample buffers are
//!   reclaimed on the control thread.
//!
//! - **[`EngineParameters`]** is the flat parameter record: grain size,
//!   density, spread, position, pitch and detune, FM, envelope, stereo
//!   placement, and an LFO that modulates any subset of parameters selected
//!   via a [`LfoTarget`] bit mask.
//!
//! - **[`GrainEvent`]**s are a bounded visualization side channel: each grain
//!   spawn publishes its position, duration and pan for a UI to drain.
//!
//! ### Getting Started
//!
//! ```rust
//! use granulate::{EngineParameters, GrainEngine};
//!
//! fn main() -> Result<(), granulate::Error> {
//!     let (mut engine, mut controller) = GrainEngine::new(48000)?;
//!
//!     // Usually decoded from an audio file
//!     let sample: Vec<f32> = (0..48000)
//!         .map(|i| (i as f32 * 0.01).sin() * 0.5)
//!         .collect();
//!     controller.set_sample_buffer(sample, 1)?;
//!
//!     let mut params = EngineParameters::default();
//!     params.grain_size = 0.08;
//!     params.density = 0.02;
//!     params.spread = 0.5;
//!     controller.update_parameters(params);
//!     controller.start();
//!
//!     // Usually called from an audio device callback
//!     let (mut left, mut right) = ([0.0f32; 128], [0.0f32; 128]);
//!     engine.process(&mut left, &mut right);
//!
//!     // Usually drained periodically by a UI
//!     for event in controller.drain_grain_events() {
//!         println!(
//!             "grain at {:.2} with {} ms, panned {:.2}",
//!             event.position,
//!             (event.duration * 1000.0) as u32,
//!             event.pan
//!         );
//!     }
//!     Ok(())
//! }
//! ```

// -------------------------------------------------------------------------------------------------

// private mods (partly re-exported)

mod buffer;
mod controller;
mod engine;
mod error;
mod parameter;

// public, flat re-exports (common types)

pub use buffer::SampleBuffer;
pub use controller::EngineController;
pub use engine::{GrainEngine, GrainEvent, GRAIN_EVENT_CAPACITY, GRAIN_POOL_SIZE};
pub use error::Error;
pub use parameter::{
    modulated, EngineParameters, EnvelopeCurve, LfoTarget, ALL_LFO_TARGETS_MASK,
};

pub mod parameters {
    //! Parameter value ranges shared with control surface consumers.

    pub use super::parameter::{
        ATTACK_RANGE, DELAY_FEEDBACK_RANGE, DELAY_MIX_RANGE, DELAY_TIME_RANGE, DENSITY_RANGE,
        DETUNE_RANGE, DIST_AMOUNT_RANGE, FILTER_FREQ_RANGE, FILTER_RES_RANGE, FM_AMOUNT_RANGE,
        FM_FREQ_RANGE, GRAIN_SIZE_RANGE, LFO_AMOUNT_RANGE, LFO_RATE_RANGE, PAN_RANGE,
        PAN_SPREAD_RANGE, PITCH_RANGE, POSITION_RANGE, RELEASE_RANGE, REVERB_DECAY_RANGE,
        REVERB_MIX_RANGE, REVERSAL_CHANCE_RANGE, SPREAD_RANGE, VOLUME_RANGE,
    };
}

// -------------------------------------------------------------------------------------------------

// public mods

pub mod utils;

pub use utils::lfo::{Lfo, LfoShape};
