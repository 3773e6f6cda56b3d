//! The realtime grain engine: scheduling, spawning and mixing of grains.

use std::sync::Arc;

use basedrop::{Collector, Owned};
use crossbeam_channel::Sender;
use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::{
    buffer::SampleBuffer,
    controller::EngineController,
    parameter::{self, EngineParameters, EnvelopeCurve, LfoTarget},
    utils::{lfo::Lfo, panning_factors, smoothed::ExponentialSmoother},
    Error,
};

use self::{grain::GrainPool, position::PositionController};

// -------------------------------------------------------------------------------------------------

pub(crate) mod grain;
pub(crate) mod position;

// -------------------------------------------------------------------------------------------------

/// Number of grain slots, and thus the maximum number of simultaneously
/// playing grains.
pub const GRAIN_POOL_SIZE: usize = 128;

/// Capacity of the grain visualization event channel.
pub const GRAIN_EVENT_CAPACITY: usize = 64;

/// Capacity of the control command queue.
const COMMAND_QUEUE_SIZE: usize = 128;

/// Parameter smoothing time constant in milliseconds.
const SMOOTHING_TIME_MS: f32 = 10.0;

/// Spawn period safety floor in seconds. Keeps modulation from driving the
/// scheduler into runaway grain rates.
const MIN_SPAWN_PERIOD: f64 = 0.005;

/// Minimum grain duration in seconds.
const MIN_GRAIN_DURATION: f32 = 0.01;

/// Playback rate magnitude floor after FM is applied.
const MIN_PLAYBACK_RATE: f32 = 0.1;

/// PRNG seed used by [`GrainEngine::new`]. Engines seeded alike and driven
/// with the same control history produce bit identical output.
const DEFAULT_RNG_SEED: u64 = 12345;

// -------------------------------------------------------------------------------------------------

/// Snapshot of a spawned grain for visualization consumers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainEvent {
    /// Normalized grain start position within the sample buffer.
    pub position: f32,
    /// Grain duration in seconds.
    pub duration: f32,
    /// Final pan position in range \[-1, 1\].
    pub pan: f32,
}

// -------------------------------------------------------------------------------------------------

/// Control messages applied by the engine at the start of each processed
/// block.
pub(crate) enum EngineMessage {
    UpdateParameters(EngineParameters),
    Start,
    Stop,
    Reset,
    SetFrozen {
        frozen: bool,
        position: f32,
    },
    SetDrift {
        enabled: bool,
        base_position: f32,
        speed: f32,
        return_tendency: f32,
    },
}

// -------------------------------------------------------------------------------------------------

/// Realtime granular synthesis engine.
///
/// The engine renders short, overlapping, enveloped grains from a sample
/// buffer into a stereo output stream. It is the realtime half of an engine,
/// controller pair: all state changes arrive through the paired
/// [`EngineController`] and are applied at block boundaries, so
/// [`process`](Self::process) can safely run on an audio thread.
///
/// **Important:** `process` is called in real-time audio threads, so it must
/// not block or allocate. All grain, smoother and queue storage is allocated
/// up front when the engine is created.
pub struct GrainEngine {
    sample_rate: u32,
    playing: bool,
    /// Engine clock in seconds, advanced by one block duration per process
    /// call.
    current_time: f64,
    /// When the scheduler spawns the next grain.
    next_spawn_time: f64,

    sample_buffer: Option<Owned<SampleBuffer>>,
    grains: GrainPool<GRAIN_POOL_SIZE>,

    lfo: Lfo,
    /// LFO value cached at the start of the current block.
    current_lfo_value: f32,

    parameters: EngineParameters,

    pitch_smoother: ExponentialSmoother,
    position_smoother: ExponentialSmoother,
    grain_size_smoother: ExponentialSmoother,
    pan_smoother: ExponentialSmoother,
    volume_smoother: ExponentialSmoother,

    position: PositionController,

    rng: SmallRng,

    command_queue: Arc<ArrayQueue<EngineMessage>>,
    buffer_queue: Arc<ArrayQueue<Owned<SampleBuffer>>>,
    event_sender: Sender<GrainEvent>,
}

impl GrainEngine {
    /// Create an engine, controller pair for the given output sample rate.
    pub fn new(sample_rate: u32) -> Result<(Self, EngineController), Error> {
        Self::with_rng_seed(sample_rate, DEFAULT_RNG_SEED)
    }

    /// Create an engine, controller pair with an explicit PRNG seed for the
    /// grain jitter draws.
    pub fn with_rng_seed(sample_rate: u32, seed: u64) -> Result<(Self, EngineController), Error> {
        if sample_rate == 0 {
            return Err(Error::InvalidSampleRate(sample_rate));
        }

        let command_queue = Arc::new(ArrayQueue::new(COMMAND_QUEUE_SIZE));
        let buffer_queue = Arc::new(ArrayQueue::new(1));
        let (event_sender, event_receiver) = crossbeam_channel::bounded(GRAIN_EVENT_CAPACITY);
        let collector = Collector::new();

        let parameters = EngineParameters::default();

        let mut pitch_smoother = ExponentialSmoother::new(sample_rate, SMOOTHING_TIME_MS);
        let mut position_smoother = ExponentialSmoother::new(sample_rate, SMOOTHING_TIME_MS);
        let mut grain_size_smoother = ExponentialSmoother::new(sample_rate, SMOOTHING_TIME_MS);
        let mut pan_smoother = ExponentialSmoother::new(sample_rate, SMOOTHING_TIME_MS);
        let mut volume_smoother = ExponentialSmoother::new(sample_rate, SMOOTHING_TIME_MS);
        pitch_smoother.init(parameters.pitch);
        position_smoother.init(parameters.position);
        grain_size_smoother.init(parameters.grain_size);
        pan_smoother.init(parameters.pan);
        volume_smoother.init(parameters.volume);

        let engine = Self {
            sample_rate,
            playing: false,
            current_time: 0.0,
            next_spawn_time: 0.0,
            sample_buffer: None,
            grains: GrainPool::new(),
            lfo: Lfo::new(parameters.lfo_rate, parameters.lfo_shape),
            current_lfo_value: 0.0,
            parameters,
            pitch_smoother,
            position_smoother,
            grain_size_smoother,
            pan_smoother,
            volume_smoother,
            position: PositionController::new(),
            rng: SmallRng::seed_from_u64(seed),
            command_queue: Arc::clone(&command_queue),
            buffer_queue: Arc::clone(&buffer_queue),
            event_sender,
        };
        let controller =
            EngineController::new(command_queue, buffer_queue, event_receiver, collector);
        Ok((engine, controller))
    }

    /// The engine's output sample rate.
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Engine clock in seconds since creation.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    /// Whether the engine is currently spawning grains.
    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Number of currently playing grains.
    pub fn active_grain_count(&self) -> usize {
        self.grains.active_count()
    }

    /// The smoothed master gain, for the external gain stage. The grain mix
    /// itself is written unattenuated.
    #[inline]
    pub fn current_volume(&self) -> f32 {
        self.volume_smoother.current()
    }

    /// The engine's current parameter set, including the effect chain
    /// pass-through values.
    #[inline]
    pub fn parameters(&self) -> &EngineParameters {
        &self.parameters
    }

    /// Render one block of audio into the given planar stereo output buffers.
    ///
    /// Both buffers are filled entirely with the same number of frames; when
    /// not playing, or when no sample buffer is present, they are zeroed and
    /// only the engine clock advances. Realtime safe.
    pub fn process(&mut self, output_left: &mut [f32], output_right: &mut [f32]) {
        #[cfg(not(feature = "assert_no_alloc"))]
        self.process_block(output_left, output_right);
        #[cfg(feature = "assert_no_alloc")]
        assert_no_alloc::assert_no_alloc(|| self.process_block(output_left, output_right));
    }

    fn process_block(&mut self, output_left: &mut [f32], output_right: &mut [f32]) {
        debug_assert_eq!(
            output_left.len(),
            output_right.len(),
            "Unbalanced output channel buffers"
        );
        let frame_count = output_left.len().min(output_right.len());

        output_left[..frame_count].fill(0.0);
        output_right[..frame_count].fill(0.0);

        self.apply_pending_commands();

        let block_duration = frame_count as f64 / self.sample_rate as f64;
        let has_buffer = self.sample_buffer.as_deref().is_some_and(|b| !b.is_empty());
        if !self.playing || !has_buffer {
            self.current_time += block_duration;
            return;
        }

        // LFO rates are sub audio, one value per block is inaudibly coarse
        self.current_lfo_value = self.lfo.value_at(self.current_time);

        // Ramp the smoothers across the block so grain spawns see the
        // interpolated values
        for _ in 0..frame_count {
            self.pitch_smoother.next();
            self.position_smoother.next();
            self.grain_size_smoother.next();
            self.pan_smoother.next();
            self.volume_smoother.next();
        }

        self.position
            .update_drift(block_duration as f32, &mut self.rng);

        // Spawn every grain whose spawn time falls into this block
        let block_end_time = self.current_time + block_duration;
        while self.next_spawn_time < block_end_time {
            self.spawn_grain();
            let density = self.modulated(self.parameters.density, LfoTarget::Density);
            self.next_spawn_time += (density as f64).max(MIN_SPAWN_PERIOD);
        }

        // Mix all active grains, sample by sample
        if let Some(buffer) = self.sample_buffer.as_deref() {
            for frame in 0..frame_count {
                let (left, right) = self.grains.process(buffer);
                output_left[frame] = left;
                output_right[frame] = right;
            }
        }

        self.current_time = block_end_time;
    }

    /// Drain and apply queued control commands. Called at the start of each
    /// block, so a command batch is never observed partially within a block.
    fn apply_pending_commands(&mut self) {
        while let Some(message) = self.command_queue.pop() {
            match message {
                EngineMessage::UpdateParameters(parameters) => self.apply_parameters(parameters),
                EngineMessage::Start => self.start(),
                EngineMessage::Stop => self.stop(),
                EngineMessage::Reset => self.grains.deactivate_all(),
                EngineMessage::SetFrozen { frozen, position } => {
                    self.position.set_frozen(frozen, position);
                }
                EngineMessage::SetDrift {
                    enabled,
                    base_position,
                    speed,
                    return_tendency,
                } => {
                    self.position
                        .set_drift(enabled, base_position, speed, return_tendency);
                }
            }
        }

        // Pick up a published sample buffer after the command batch, so the
        // smoothers snap to the batch's parameter targets. Dropping the
        // previous buffer here defers its deallocation to the controller.
        while let Some(buffer) = self.buffer_queue.pop() {
            self.sample_buffer = Some(buffer);
            self.snap_smoothers();
        }
    }

    fn apply_parameters(&mut self, parameters: EngineParameters) {
        self.lfo.set_rate(parameters.lfo_rate);
        self.lfo.set_shape(parameters.lfo_shape);

        self.pitch_smoother.set_target(parameters.pitch);
        self.position_smoother.set_target(parameters.position);
        self.grain_size_smoother.set_target(parameters.grain_size);
        self.pan_smoother.set_target(parameters.pan);
        self.volume_smoother.set_target(parameters.volume);

        self.parameters = parameters;
    }

    /// Snap all smoothers to their targets. Applied on sample buffer swaps,
    /// where ramping from values meant for the previous buffer makes no sense.
    fn snap_smoothers(&mut self) {
        self.pitch_smoother.init(self.pitch_smoother.target());
        self.position_smoother.init(self.position_smoother.target());
        self.grain_size_smoother
            .init(self.grain_size_smoother.target());
        self.pan_smoother.init(self.pan_smoother.target());
        self.volume_smoother.init(self.volume_smoother.target());
    }

    fn start(&mut self) {
        if self.playing {
            return;
        }
        self.playing = true;
        self.next_spawn_time = self.current_time;
    }

    /// Stop spawning and silence all grains. Callers are expected to fade the
    /// downstream gain for a click free stop.
    fn stop(&mut self) {
        self.playing = false;
        self.grains.deactivate_all();
    }

    /// Spawn one grain from the current smoothed and modulated parameters.
    fn spawn_grain(&mut self) {
        let buffer_len = match self.sample_buffer.as_deref() {
            Some(buffer) if !buffer.is_empty() => buffer.len() as f32,
            _ => return,
        };

        let grain_size = self.modulated(self.grain_size_smoother.current(), LfoTarget::GrainSize);
        let spread = self.modulated(self.parameters.spread, LfoTarget::Spread);
        let pitch = self.modulated(self.pitch_smoother.current(), LfoTarget::Pitch);
        let fm_freq = self.modulated(self.parameters.fm_freq, LfoTarget::FmFreq);
        let fm_amount = self.modulated(self.parameters.fm_amount, LfoTarget::FmAmount);
        let attack = self.modulated(self.parameters.attack, LfoTarget::Attack);
        let release = self.modulated(self.parameters.release, LfoTarget::Release);
        let pan_center = self.modulated(self.pan_smoother.current(), LfoTarget::Pan);
        let pan_spread = self.modulated(self.parameters.pan_spread, LfoTarget::PanSpread);

        let base_position = self.position.base_position(self.position_smoother.current());
        let position = self.modulated(base_position, LfoTarget::Position);

        let grain_duration = grain_size.max(MIN_GRAIN_DURATION);
        let samples_total = ((grain_duration * self.sample_rate as f32).round() as i32).max(1);

        // Playback rate from pitch plus a random detune draw
        let detune = self.parameters.detune;
        let cents = pitch * 100.0 + (self.rng.random::<f32>() * detune * 2.0 - detune);
        let mut rate = (cents / 1200.0).exp2();

        let reversed = self.rng.random::<f32>() < self.parameters.grain_reversal_chance;
        if reversed {
            rate = -rate;
        }

        // The FM carrier is evaluated once at spawn time; a grain's pitch
        // stays fixed for its whole duration.
        let mut fm_offset = 0.0;
        if fm_amount > 0.0 {
            fm_offset = (self.current_time as f32 * fm_freq).sin() * (fm_amount * 0.01);
        }
        let mut final_rate = (rate + fm_offset).abs().max(MIN_PLAYBACK_RATE);
        if reversed {
            final_rate = -final_rate;
        }

        // Spread jitters the start around the position center, clamped so the
        // grain's read range stays inside the buffer
        let center = position * buffer_len;
        let offset = (self.rng.random::<f32>() * 2.0 - 1.0) * spread * buffer_len * 0.5;
        let grain_span = grain_duration * self.sample_rate as f32;
        let max_start = (buffer_len - grain_span * final_rate.abs()).max(0.0);
        let mut start = (center + offset).clamp(0.0, max_start);
        if reversed {
            // Reversed grains start at the end of their region and read
            // backwards through it
            start = (start + grain_span).min(buffer_len - 1.0);
        }

        let random_pan = (self.rng.random::<f32>() * 2.0 - 1.0) * pan_spread;
        let final_pan = (pan_center + random_pan).clamp(-1.0, 1.0);
        let (pan_left, pan_right) = panning_factors(final_pan);

        let exponential_env = self.parameters.envelope_curve == EnvelopeCurve::Exponential;

        self.grains.allocate().activate(
            start,
            final_rate,
            samples_total,
            attack,
            release,
            exponential_env,
            pan_left,
            pan_right,
        );

        // Publish the spawn for visualization. A full channel drops the event.
        let event = GrainEvent {
            position: start / buffer_len,
            duration: grain_duration,
            pan: final_pan,
        };
        let _ = self.event_sender.try_send(event);
    }

    /// Apply the block's cached LFO value to a parameter when its target bit
    /// is set in the parameter mask.
    #[inline]
    fn modulated(&self, base: f32, target: LfoTarget) -> f32 {
        parameter::modulated(
            base,
            target,
            self.parameters.lfo_target_mask,
            self.current_lfo_value,
            self.parameters.lfo_amount,
        )
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 48000;
    const BLOCK_SIZE: usize = 128;

    /// Parameters that spawn exactly one centered, unmodulated grain of 480
    /// samples per half second.
    fn single_grain_parameters() -> EngineParameters {
        EngineParameters {
            grain_size: 0.01,
            density: 0.5,
            spread: 0.0,
            position: 0.0,
            grain_reversal_chance: 0.0,
            pan: 0.0,
            pan_spread: 0.0,
            pitch: 0.0,
            detune: 0.0,
            fm_amount: 0.0,
            attack: 0.5,
            release: 0.5,
            lfo_amount: 0.0,
            ..EngineParameters::default()
        }
    }

    fn process_blocks(engine: &mut GrainEngine, blocks: usize) {
        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..blocks {
            engine.process(&mut left, &mut right);
        }
    }

    #[test]
    fn rejects_zero_sample_rate() {
        assert!(matches!(
            GrainEngine::new(0),
            Err(Error::InvalidSampleRate(0))
        ));
    }

    #[test]
    fn silent_without_a_sample_buffer() {
        let (mut engine, controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.start();

        let mut left = [1.0f32; BLOCK_SIZE];
        let mut right = [1.0f32; BLOCK_SIZE];
        engine.process(&mut left, &mut right);

        assert!(left.iter().all(|&sample| sample == 0.0));
        assert!(right.iter().all(|&sample| sample == 0.0));
        assert!(engine.is_playing());
        assert_eq!(engine.current_time(), 128.0 / 48000.0);
        assert_eq!(engine.active_grain_count(), 0);
        assert!(controller.drain_grain_events().is_empty());
    }

    #[test]
    fn single_grain_renders_its_envelope() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(single_grain_parameters());
        controller
            .set_sample_buffer(vec![1.0; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.start();

        let mut left = [0.0f32; 480];
        let mut right = [0.0f32; 480];
        engine.process(&mut left, &mut right);

        // Exactly one grain, spawned at the block start
        let events = controller.drain_grain_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].position, 0.0);
        assert_eq!(events[0].duration, 0.01);
        assert_eq!(events[0].pan, 0.0);

        // Center pan spreads the signal equally
        for (l, r) in left.iter().zip(right.iter()) {
            assert!((l - r).abs() < 1e-6);
        }

        // Envelope: silent start, ~0.707 peak at the attack-release meeting
        // point, near silent end
        assert_eq!(left[0], 0.0);
        let peak = left.iter().fold(0.0f32, |max, &sample| max.max(sample));
        assert!((peak - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!((left[240] - peak).abs() < 1e-2);
        assert!(left[100] < left[200]);
        assert!(left[300] > left[400]);
        assert!(left[479] < 0.01);

        // The grain is done at block end
        assert_eq!(engine.active_grain_count(), 0);
    }

    #[test]
    fn reversed_grains_stay_inside_the_buffer() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_reversal_chance: 1.0,
            ..single_grain_parameters()
        });
        controller.set_sample_buffer(vec![1.0; 1000], 1).unwrap();
        controller.start();

        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..20 {
            engine.process(&mut left, &mut right);
            for grain in engine.grains.iter().filter(|grain| grain.is_active()) {
                assert!(grain.rate() < 0.0, "Grain plays forward");
                assert!(grain.read_pos() >= 0.0);
                assert!(grain.read_pos() < 1000.0);
            }
        }

        // Reversed grains start at the end of their read region
        let events = controller.drain_grain_events();
        assert!(!events.is_empty());
        assert_eq!(events[0].position, 0.48);
    }

    #[test]
    fn spawn_rate_follows_density() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            density: 0.005,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.start();

        // One second in 128 frame blocks, draining events as a UI would
        let mut spawned = 0;
        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..(SAMPLE_RATE as usize / BLOCK_SIZE) {
            engine.process(&mut left, &mut right);
            spawned += controller.drain_grain_events().len();
        }
        assert!((199..=201).contains(&spawned), "Spawned {spawned} grains");
    }

    #[test]
    fn active_grains_never_exceed_the_pool() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_size: 0.5,
            density: 0.005,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize * 2], 1)
            .unwrap();
        controller.start();

        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..(SAMPLE_RATE as usize / BLOCK_SIZE) {
            engine.process(&mut left, &mut right);
            assert!(engine.active_grain_count() <= GRAIN_POOL_SIZE);
        }
        // Steady state: grain lifetime over spawn period concurrent grains
        assert!((99..=101).contains(&engine.active_grain_count()));
    }

    #[test]
    fn identical_histories_render_identically() {
        let noise: Vec<f32> = (0..48000).map(|i| ((i % 101) as f32 / 50.0) - 1.0).collect();
        let parameters = EngineParameters {
            spread: 1.0,
            detune: 50.0,
            pan_spread: 0.8,
            grain_reversal_chance: 0.5,
            density: 0.01,
            ..single_grain_parameters()
        };

        let (mut engine_a, mut controller_a) =
            GrainEngine::with_rng_seed(SAMPLE_RATE, 7).unwrap();
        controller_a.update_parameters(parameters.clone());
        controller_a.set_sample_buffer(noise.clone(), 1).unwrap();
        controller_a.start();

        let (mut engine_b, mut controller_b) =
            GrainEngine::with_rng_seed(SAMPLE_RATE, 7).unwrap();
        controller_b.update_parameters(parameters.clone());
        controller_b.set_sample_buffer(noise, 1).unwrap();
        controller_b.start();

        let mut left_a = [0.0f32; BLOCK_SIZE];
        let mut right_a = [0.0f32; BLOCK_SIZE];
        let mut left_b = [0.0f32; BLOCK_SIZE];
        let mut right_b = [0.0f32; BLOCK_SIZE];
        for _ in 0..40 {
            // Re-submitting the same parameter record must not change output
            controller_b.update_parameters(parameters.clone());
            engine_a.process(&mut left_a, &mut right_a);
            engine_b.process(&mut left_b, &mut right_b);
            assert_eq!(left_a, left_b);
            assert_eq!(right_a, right_b);
        }
    }

    #[test]
    fn engine_time_is_strictly_monotonic() {
        let (mut engine, _controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        let mut expected = 0.0f64;
        for frames in [128usize, 64, 1, 480, 37] {
            let mut left = vec![0.0f32; frames];
            let mut right = vec![0.0f32; frames];
            let before = engine.current_time();
            engine.process(&mut left, &mut right);
            expected += frames as f64 / SAMPLE_RATE as f64;
            assert!(engine.current_time() > before);
            assert_eq!(engine.current_time(), expected);
        }
    }

    #[test]
    fn frozen_position_pins_grain_spawns() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            density: 0.01,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.set_frozen(true, 0.5);
        controller.start();

        process_blocks(&mut engine, 40);
        let events = controller.drain_grain_events();
        assert!(!events.is_empty());
        assert!(events.iter().all(|event| event.position == 0.5));

        // Unfreezing falls back to the manual position parameter
        controller.set_frozen(false, 0.0);
        process_blocks(&mut engine, 40);
        let events = controller.drain_grain_events();
        assert!(!events.is_empty());
        assert!(events.iter().all(|event| event.position == 0.0));
    }

    #[test]
    fn drifting_positions_wander_within_bounds() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            density: 0.01,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.set_drift(true, 0.5, 1.0, 0.5);
        controller.start();

        let mut positions = Vec::new();
        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..400 {
            engine.process(&mut left, &mut right);
            positions.extend(
                controller
                    .drain_grain_events()
                    .iter()
                    .map(|event| event.position),
            );
        }
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|p| (0.0..=1.0).contains(p)));
        // The walk stays around its base and actually moves
        let mean = positions.iter().sum::<f32>() / positions.len() as f32;
        assert!((mean - 0.5).abs() < 0.1);
        assert!(positions.iter().any(|p| (p - 0.5).abs() > 1e-4));
    }

    #[test]
    fn stop_silences_and_start_resumes() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_size: 0.5,
            density: 0.01,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.start();

        process_blocks(&mut engine, 20);
        assert!(engine.active_grain_count() > 0);

        controller.stop();
        let mut left = [1.0f32; BLOCK_SIZE];
        let mut right = [1.0f32; BLOCK_SIZE];
        let time_before = engine.current_time();
        engine.process(&mut left, &mut right);
        assert!(!engine.is_playing());
        assert_eq!(engine.active_grain_count(), 0);
        assert!(left.iter().all(|&sample| sample == 0.0));
        assert!(engine.current_time() > time_before);

        controller.drain_grain_events();
        controller.start();
        process_blocks(&mut engine, 20);
        assert!(engine.active_grain_count() > 0);
        assert!(!controller.drain_grain_events().is_empty());
    }

    #[test]
    fn reset_clears_grains_but_keeps_playing() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_size: 0.5,
            density: 0.01,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.start();

        process_blocks(&mut engine, 40);
        let before = engine.active_grain_count();
        assert!(before > 10);

        controller.reset();
        process_blocks(&mut engine, 1);
        assert!(engine.is_playing());
        assert!(engine.active_grain_count() < before);
    }

    #[test]
    fn out_of_range_parameters_are_clamped_on_ingress() {
        let (mut engine, controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_size: 5.0,
            pitch: 100.0,
            ..EngineParameters::default()
        });
        process_blocks(&mut engine, 1);
        assert_eq!(engine.parameters().grain_size, 0.5);
        assert_eq!(engine.parameters().pitch, 24.0);
    }

    #[test]
    fn fm_detunes_grains_spawned_later_in_time() {
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            grain_size: 0.5,
            density: 0.005,
            fm_freq: 100.0,
            fm_amount: 100.0,
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize * 2], 1)
            .unwrap();
        controller.start();

        process_blocks(&mut engine, 4);
        // The grain spawned at time zero plays at rate 1; later spawns pick
        // up the FM carrier offset
        let rates: Vec<f32> = engine
            .grains
            .iter()
            .filter(|grain| grain.is_active())
            .map(|grain| grain.rate())
            .collect();
        assert!(rates.len() > 1);
        assert!(rates.iter().any(|&rate| (rate - 1.0).abs() < 1e-6));
        assert!(rates.iter().any(|&rate| (rate - 1.0).abs() > 0.1));
    }

    #[test]
    fn lfo_spreads_spawn_positions() {
        // A slow sine on the position target moves grain spawns around the
        // static position parameter
        let (mut engine, mut controller) = GrainEngine::new(SAMPLE_RATE).unwrap();
        controller.update_parameters(EngineParameters {
            position: 0.5,
            density: 0.01,
            lfo_rate: 2.0,
            lfo_amount: 1.0,
            lfo_target_mask: LfoTarget::Position.bit(),
            ..single_grain_parameters()
        });
        controller
            .set_sample_buffer(vec![0.5; SAMPLE_RATE as usize], 1)
            .unwrap();
        controller.start();

        let mut positions = Vec::new();
        let mut left = [0.0f32; BLOCK_SIZE];
        let mut right = [0.0f32; BLOCK_SIZE];
        for _ in 0..400 {
            engine.process(&mut left, &mut right);
            positions.extend(
                controller
                    .drain_grain_events()
                    .iter()
                    .map(|event| event.position),
            );
        }
        let min = positions.iter().cloned().fold(f32::MAX, f32::min);
        let max = positions.iter().cloned().fold(f32::MIN, f32::max);
        assert!(min < 0.1, "LFO never pushed the position down: {min}");
        assert!(max > 0.9, "LFO never pushed the position up: {max}");
    }
}
