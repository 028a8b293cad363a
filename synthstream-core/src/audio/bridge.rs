//! Pull side of the stream: what the backend's hardware thread calls.
//!
//! The backend owns the thread, the core owns the data. `pull` pops what the
//! producer has made available and writes silence over any shortfall. It
//! never allocates, blocks or logs, so it is safe on a real-time thread the
//! core does not schedule.

use std::sync::Arc;

use crate::buffering::AudioConsumer;
use crate::engine::diagnostics::StreamDiagnostics;

/// Consumer half of a session's ring plus the bookkeeping for pulls.
pub struct ConsumerBridge {
    consumer: AudioConsumer,
    channels: usize,
    diagnostics: Arc<StreamDiagnostics>,
}

impl ConsumerBridge {
    pub fn new(consumer: AudioConsumer, channels: u16, diagnostics: Arc<StreamDiagnostics>) -> Self {
        Self {
            consumer,
            channels: channels.max(1) as usize,
            diagnostics,
        }
    }

    /// Fill `frame_count * channels` interleaved samples of `destination`.
    ///
    /// If `destination` is shorter than that, only `destination` is filled.
    /// Samples beyond the requested count are left untouched.
    #[inline]
    pub fn pull(&mut self, destination: &mut [f32], frame_count: usize) {
        let wanted = frame_count
            .saturating_mul(self.channels)
            .min(destination.len());
        self.fill(&mut destination[..wanted]);
    }

    /// Fill all of `destination`, zero-filling whatever the ring cannot supply.
    #[inline]
    pub fn fill(&mut self, destination: &mut [f32]) {
        let got = self.consumer.pop(destination);
        if got < destination.len() {
            destination[got..].fill(0.0);
        }
        self.diagnostics.record_pull(destination.len(), got);
    }

    pub fn channels(&self) -> u16 {
        self.channels as u16
    }

    /// Samples ready in the ring right now.
    pub fn available(&self) -> usize {
        self.consumer.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::{create_audio_ring, AudioProducer, AudioRing};

    fn bridge(channels: u16) -> (AudioRing, AudioProducer, ConsumerBridge, Arc<StreamDiagnostics>) {
        let ring = create_audio_ring(64).unwrap();
        let (producer, consumer) = ring.split().unwrap();
        let diagnostics = Arc::new(StreamDiagnostics::default());
        let bridge = ConsumerBridge::new(consumer, channels, Arc::clone(&diagnostics));
        (ring, producer, bridge, diagnostics)
    }

    #[test]
    fn full_pull_passes_samples_through() {
        let (_ring, mut producer, mut bridge, diagnostics) = bridge(2);
        producer.push(&[0.1, 0.2, 0.3, 0.4]);

        let mut out = [9.0f32; 4];
        bridge.pull(&mut out, 2);
        assert_eq!(out, [0.1, 0.2, 0.3, 0.4]);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.samples_delivered, 4);
        assert_eq!(snap.underrun_events, 0);
    }

    #[test]
    fn underrun_is_zero_filled_not_stale() {
        let (_ring, mut producer, mut bridge, diagnostics) = bridge(2);
        producer.push(&[0.5, 0.5]);

        let mut out = [9.0f32; 8];
        bridge.pull(&mut out, 4);
        assert_eq!(out, [0.5, 0.5, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.samples_zero_filled, 6);
        assert_eq!(snap.underrun_events, 1);
    }

    #[test]
    fn empty_ring_yields_silence() {
        let (_ring, _producer, mut bridge, _diagnostics) = bridge(1);
        let mut out = [1.0f32; 16];
        bridge.fill(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn pull_only_touches_the_requested_frames() {
        let (_ring, mut producer, mut bridge, _diagnostics) = bridge(2);
        producer.push(&[1.0; 8]);

        let mut out = [7.0f32; 8];
        bridge.pull(&mut out, 1);
        assert_eq!(out, [1.0, 1.0, 7.0, 7.0, 7.0, 7.0, 7.0, 7.0]);
        assert_eq!(bridge.available(), 6);
    }

    #[test]
    fn oversized_request_is_clamped_to_destination() {
        let (_ring, _producer, mut bridge, diagnostics) = bridge(2);
        let mut out = [3.0f32; 4];
        bridge.pull(&mut out, 1_000);
        assert_eq!(out, [0.0; 4]);
        assert_eq!(diagnostics.snapshot().samples_zero_filled, 4);
    }
}
