//! Non-realtime control interface to a running engine.

use std::sync::Arc;

use basedrop::{Collector, Owned};
use crossbeam_channel::Receiver;
use crossbeam_queue::ArrayQueue;

use crate::{
    buffer::SampleBuffer,
    engine::{EngineMessage, GrainEvent},
    parameter::EngineParameters,
    Error,
};

// -------------------------------------------------------------------------------------------------

/// Control thread handle to a [`GrainEngine`](crate::GrainEngine).
///
/// All methods are safe to call while the paired engine processes audio on
/// another thread: commands travel through bounded lock-free queues and are
/// applied by the engine at its next block boundary. When the command queue is
/// saturated the oldest pending command is dropped, so the most recent
/// parameter update always wins.
///
/// Sample buffers the engine retires on a swap are reclaimed here, keeping
/// deallocation off the audio thread.
pub struct EngineController {
    command_queue: Arc<ArrayQueue<EngineMessage>>,
    buffer_queue: Arc<ArrayQueue<Owned<SampleBuffer>>>,
    event_receiver: Receiver<GrainEvent>,
    collector: Collector,
}

impl EngineController {
    pub(crate) fn new(
        command_queue: Arc<ArrayQueue<EngineMessage>>,
        buffer_queue: Arc<ArrayQueue<Owned<SampleBuffer>>>,
        event_receiver: Receiver<GrainEvent>,
        collector: Collector,
    ) -> Self {
        Self {
            command_queue,
            buffer_queue,
            event_receiver,
            collector,
        }
    }

    /// Replace the engine's parameter set. Values outside their documented
    /// ranges are clamped here at the engine boundary.
    pub fn update_parameters(&self, parameters: EngineParameters) {
        self.command_queue
            .force_push(EngineMessage::UpdateParameters(parameters.clamped()));
    }

    /// Hand new sample data over to the engine. Stereo `data` is expected
    /// interleaved and is downmixed to mono frames here, off the audio
    /// thread. The engine picks the buffer up at its next block boundary; the
    /// buffer it replaces is freed here on a later call.
    pub fn set_sample_buffer(&mut self, data: Vec<f32>, channel_count: usize) -> Result<(), Error> {
        // Reclaim buffers the audio thread has retired since the last swap
        self.collector.collect();

        let buffer = SampleBuffer::new(data, channel_count)?;
        let handle = self.collector.handle();
        if self
            .buffer_queue
            .force_push(Owned::new(&handle, buffer))
            .is_some()
        {
            // The displaced buffer was never seen by the engine, it just
            // drops on this thread
            log::warn!("Replacing a pending sample buffer the engine never picked up");
        }
        Ok(())
    }

    /// Start spawning grains.
    pub fn start(&self) {
        self.command_queue.force_push(EngineMessage::Start);
    }

    /// Stop playback and deactivate all grains. Callers should fade the
    /// downstream gain for a click free stop.
    pub fn stop(&self) {
        self.command_queue.force_push(EngineMessage::Stop);
    }

    /// Deactivate all grains without stopping the transport.
    pub fn reset(&self) {
        self.command_queue.force_push(EngineMessage::Reset);
    }

    /// Freeze (or unfreeze) the grain read position. While frozen, the
    /// captured `position` overrides both the manual position parameter and
    /// drift.
    pub fn set_frozen(&self, frozen: bool, position: f32) {
        self.command_queue
            .force_push(EngineMessage::SetFrozen { frozen, position });
    }

    /// Enable or disable position drift: a bounded random walk around
    /// `base_position` with the given speed and restoring tendency, all in
    /// range \[0, 1\].
    pub fn set_drift(&self, enabled: bool, base_position: f32, speed: f32, return_tendency: f32) {
        self.command_queue.force_push(EngineMessage::SetDrift {
            enabled,
            base_position,
            speed,
            return_tendency,
        });
    }

    /// Drain all pending grain visualization events. UIs typically call this
    /// a few dozen times per second and render the result.
    pub fn drain_grain_events(&self) -> Vec<GrainEvent> {
        self.event_receiver.try_iter().collect()
    }
}

// -------------------------------------------------------------------------------------------------
