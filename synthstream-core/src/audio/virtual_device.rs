//! Software-clocked output device.
//!
//! `VirtualBackend` stands in for sound hardware: a dedicated thread paces
//! itself with a [`Clock`] and pulls one hardware buffer per tick through the
//! bridge, exactly like a device callback would. Pulled audio can be captured
//! for offline rendering (WAV export) or inspection in tests.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::{AudioBackend, ConsumerBridge};
use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};

/// Bounded sink for audio pulled by a [`VirtualBackend`].
///
/// Appending takes a lock, which is fine on the virtual device thread but
/// would not be on a real hardware callback.
#[derive(Clone, Debug)]
pub struct CaptureBuffer {
    samples: Arc<Mutex<Vec<f32>>>,
    limit: usize,
}

impl CaptureBuffer {
    /// Keep at most `limit` samples; later audio is discarded.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(Vec::with_capacity(limit))),
            limit,
        }
    }

    pub fn append(&self, samples: &[f32]) {
        let mut captured = self.samples.lock();
        let room = self.limit.saturating_sub(captured.len());
        captured.extend_from_slice(&samples[..samples.len().min(room)]);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.limit
    }

    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> Vec<f32> {
        self.samples.lock().clone()
    }

    /// Move the captured audio out, leaving the buffer empty.
    pub fn take(&self) -> Vec<f32> {
        std::mem::take(&mut *self.samples.lock())
    }
}

struct Worker {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Output device driven by a software clock instead of sound hardware.
pub struct VirtualBackend {
    clock: Arc<dyn Clock>,
    capture: Option<CaptureBuffer>,
    unavailable: bool,
    config: Option<StreamConfig>,
    bridge: Option<ConsumerBridge>,
    worker: Option<Worker>,
}

impl VirtualBackend {
    /// Wall-clock paced device with no capture.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            capture: None,
            unavailable: false,
            config: None,
            bridge: None,
            worker: None,
        }
    }

    /// A device that refuses activation, as if it had been unplugged.
    pub fn unavailable() -> Self {
        let mut backend = Self::new();
        backend.unavailable = true;
        backend
    }

    /// Record every pulled buffer into `capture`.
    pub fn capture_into(mut self, capture: CaptureBuffer) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn is_active(&self) -> bool {
        self.config.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for VirtualBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for VirtualBackend {
    fn name(&self) -> &str {
        "virtual"
    }

    fn activate(&mut self, config: &StreamConfig) -> Result<()> {
        if self.unavailable {
            return Err(StreamError::Initialization(
                "virtual output device is unavailable".into(),
            ));
        }
        debug!(
            sample_rate = config.sample_rate,
            channels = config.channels,
            "virtual output device activated"
        );
        self.config = Some(config.clone());
        Ok(())
    }

    fn register_pull(&mut self, bridge: ConsumerBridge) -> Result<()> {
        if self.config.is_none() {
            return Err(StreamError::Backend("virtual device is not activated".into()));
        }
        self.bridge = Some(bridge);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(StreamError::Backend("virtual device already running".into()));
        }
        let config = self
            .config
            .clone()
            .ok_or_else(|| StreamError::Backend("virtual device is not activated".into()))?;
        let mut bridge = self
            .bridge
            .take()
            .ok_or_else(|| StreamError::Backend("no pull function registered".into()))?;

        let running = Arc::new(AtomicBool::new(true));
        let clock = Arc::clone(&self.clock);
        let capture = self.capture.clone();
        let flag = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name("virtual-output".into())
            .spawn(move || {
                let frames = config.frames_per_buffer as usize;
                let period = config.buffer_period();
                // One hardware buffer, allocated before the pull loop.
                let mut buffer = vec![0f32; config.samples_per_buffer()];

                while clock.pace(period, &flag) {
                    bridge.pull(&mut buffer, frames);
                    if let Some(capture) = &capture {
                        capture.append(&buffer);
                    }
                }
                debug!("virtual output thread exiting");
            })?;

        info!("virtual output device started");
        self.worker = Some(Worker { running, handle });
        Ok(())
    }

    fn stop(&mut self) {
        self.bridge = None;
        if let Some(worker) = self.worker.take() {
            worker.running.store(false, Ordering::Release);
            if worker.handle.join().is_err() {
                error!("virtual output thread panicked");
            }
            info!("virtual output device stopped");
        }
    }

    fn release(&mut self) {
        self.stop();
        self.config = None;
    }
}

impl Drop for VirtualBackend {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::{Duration, Instant};

    use crate::buffering::create_audio_ring;
    use crate::clock::ManualClock;
    use crate::engine::diagnostics::StreamDiagnostics;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let start = Instant::now();
        while !condition() {
            assert!(
                start.elapsed() < Duration::from_secs(2),
                "timed out waiting for condition"
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn capture_buffer_respects_limit() {
        let capture = CaptureBuffer::with_limit(5);
        capture.append(&[1.0, 2.0, 3.0]);
        capture.append(&[4.0, 5.0, 6.0]);
        assert!(capture.is_full());
        assert_eq!(capture.take(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(capture.is_empty());
    }

    #[test]
    fn unavailable_device_fails_activation() {
        let mut backend = VirtualBackend::unavailable();
        let err = backend.activate(&StreamConfig::default()).unwrap_err();
        assert!(matches!(err, StreamError::Initialization(_)));
        assert!(!backend.is_active());
    }

    #[test]
    fn start_requires_a_registered_pull() {
        let mut backend = VirtualBackend::new();
        backend.activate(&StreamConfig::default()).unwrap();
        assert!(matches!(backend.start(), Err(StreamError::Backend(_))));
    }

    #[test]
    fn pulls_one_buffer_per_tick_and_releases_the_consumer() {
        let config = StreamConfig::new(48_000, 2, 4).with_ring_capacity(64);
        let clock = Arc::new(ManualClock::new());
        let capture = CaptureBuffer::with_limit(1_024);
        let mut backend =
            VirtualBackend::with_clock(clock.clone()).capture_into(capture.clone());
        backend.activate(&config).unwrap();

        let ring = create_audio_ring(config.ring_capacity).unwrap();
        let (mut producer, consumer) = ring.split().unwrap();
        let diagnostics = Arc::new(StreamDiagnostics::default());
        producer.push(&[0.25; 12]);

        backend
            .register_pull(ConsumerBridge::new(consumer, config.channels, diagnostics.clone()))
            .unwrap();
        backend.start().unwrap();
        assert!(backend.is_running());

        clock.advance(2);
        wait_until(|| capture.len() == 16);

        let captured = capture.snapshot();
        assert!(captured[..12].iter().all(|s| *s == 0.25));
        assert!(captured[12..].iter().all(|s| *s == 0.0));
        assert_eq!(diagnostics.snapshot().underrun_events, 1);

        backend.stop();
        drop(producer);
        assert!(!ring.is_split(), "bridge must be dropped on stop");
    }
}
