//! Lock-free SPSC ring buffer for audio samples.
//!
//! `push` and `pop` never block and never allocate, so both are safe to call
//! from a real-time audio thread.

pub mod ring;
mod storage;

pub use ring::{RingBuffer, RingConsumer, RingMonitor, RingProducer};

use crate::error::Result;

/// Ring of interleaved f32 samples shared by a session's producer and backend.
pub type AudioRing = RingBuffer<f32>;

/// Write half, held by the producer loop thread.
pub type AudioProducer = RingProducer<f32>;

/// Read half, held by the backend's pull thread through the bridge.
pub type AudioConsumer = RingConsumer<f32>;

/// Default capacity: 2^16 = 65 536 samples ≈ 0.68 s of stereo at 48 kHz.
pub const RING_CAPACITY: usize = 1 << 16;

/// Allocate an audio ring with `capacity` slots.
///
/// # Errors
/// `StreamError::InvalidCapacity` unless `capacity` is a power of two `>= 2`.
pub fn create_audio_ring(capacity: usize) -> Result<AudioRing> {
    AudioRing::new(capacity)
}
