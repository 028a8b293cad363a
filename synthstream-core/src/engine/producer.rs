//! Paced producer loop.
//!
//! ## Per iteration
//!
//! ```text
//! 1. clock.pace(period)   period = frames_per_buffer / sample_rate
//! 2. source.render(scratch, frames, channels)
//! 3. ring.push(scratch)   shortfall dropped, counted, never retried
//! ```
//!
//! The loop never waits on the ring. When the consumer falls behind, the
//! producer keeps wall-clock pace and the excess is dropped; losing data is
//! preferred to stalling a real-time chain.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::{
    buffering::AudioProducer,
    clock::Clock,
    config::StreamConfig,
    engine::diagnostics::StreamDiagnostics,
    error::Result,
    synth::SynthSource,
};

/// Everything the producer thread owns, passed as one struct so the spawn
/// closure stays tidy.
pub struct ProducerContext {
    pub producer: AudioProducer,
    pub source: Box<dyn SynthSource>,
    pub clock: Arc<dyn Clock>,
    pub running: Arc<AtomicBool>,
    pub diagnostics: Arc<StreamDiagnostics>,
    pub frames: usize,
    pub channels: u16,
    pub period: Duration,
}

impl ProducerContext {
    pub fn new(
        config: &StreamConfig,
        producer: AudioProducer,
        source: Box<dyn SynthSource>,
        clock: Arc<dyn Clock>,
        running: Arc<AtomicBool>,
        diagnostics: Arc<StreamDiagnostics>,
    ) -> Self {
        Self {
            producer,
            source,
            clock,
            running,
            diagnostics,
            frames: config.frames_per_buffer as usize,
            channels: config.channels,
            period: config.buffer_period(),
        }
    }
}

/// Run the producer loop until the running flag is lowered.
///
/// Returns the number of iterations completed.
pub fn run(mut ctx: ProducerContext) -> u64 {
    debug!(
        frames = ctx.frames,
        channels = ctx.channels,
        period_us = ctx.period.as_micros() as u64,
        "producer loop started"
    );

    // Scratch chunk, allocated once; render() overwrites it every iteration.
    let mut scratch = vec![0f32; ctx.frames * ctx.channels as usize];
    let mut iterations = 0u64;
    let mut dropped = 0u64;

    while ctx.clock.pace(ctx.period, &ctx.running) {
        ctx.source.render(&mut scratch, ctx.frames, ctx.channels);
        let pushed = ctx.producer.push(&scratch);
        ctx.diagnostics.record_push(scratch.len(), pushed);

        iterations += 1;
        dropped += (scratch.len() - pushed) as u64;
    }

    info!(iterations, dropped, "producer loop exited");
    iterations
}

/// Join handle plus cancellation flag for one producer thread.
pub struct ProducerHandle {
    running: Arc<AtomicBool>,
    handle: JoinHandle<u64>,
}

impl ProducerHandle {
    /// Spawn the loop on a dedicated `synth-producer` thread.
    ///
    /// `ctx.running` must already be raised.
    pub fn spawn(ctx: ProducerContext) -> Result<Self> {
        let running = Arc::clone(&ctx.running);
        let handle = thread::Builder::new()
            .name("synth-producer".into())
            .spawn(move || run(ctx))?;
        Ok(Self { running, handle })
    }

    /// Lower the flag without waiting.
    pub fn signal_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Lower the flag and wait for the loop to observe it (at most one
    /// pacing period). Returns the iterations completed, or `None` if the
    /// synthesis source panicked.
    pub fn stop(self) -> Option<u64> {
        self.signal_stop();
        match self.handle.join() {
            Ok(iterations) => Some(iterations),
            Err(_) => {
                error!("producer thread panicked");
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
