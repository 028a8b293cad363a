//! Stream configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffering::RING_CAPACITY;
use crate::error::{Result, StreamError};

/// Parameters fixed for the lifetime of an opened session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct StreamConfig {
    /// Frames per second. Default: 48000.
    pub sample_rate: u32,
    /// Interleaved channels per frame. Default: 2.
    pub channels: u16,
    /// Frames rendered per producer iteration and pulled per hardware
    /// callback. Default: 256 (≈ 5.3 ms at 48 kHz).
    pub frames_per_buffer: u32,
    /// Ring slots in samples; must be a power of two. Default: 65536.
    pub ring_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            frames_per_buffer: 256,
            ring_capacity: RING_CAPACITY,
        }
    }
}

impl StreamConfig {
    pub fn new(sample_rate: u32, channels: u16, frames_per_buffer: u32) -> Self {
        Self {
            sample_rate,
            channels,
            frames_per_buffer,
            ..Self::default()
        }
    }

    pub fn with_ring_capacity(mut self, ring_capacity: usize) -> Self {
        self.ring_capacity = ring_capacity;
        self
    }

    /// Load from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Check every field, reporting the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(StreamError::InvalidConfig("sample rate must be > 0".into()));
        }
        if self.channels == 0 {
            return Err(StreamError::InvalidConfig("channel count must be >= 1".into()));
        }
        if self.frames_per_buffer == 0 {
            return Err(StreamError::InvalidConfig(
                "frames per buffer must be > 0".into(),
            ));
        }
        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(StreamError::InvalidConfig(format!(
                "ring capacity {} is not a power of two >= 2",
                self.ring_capacity
            )));
        }
        if self.ring_capacity <= self.samples_per_buffer() {
            return Err(StreamError::InvalidConfig(format!(
                "ring capacity {} cannot hold one buffer of {} samples",
                self.ring_capacity,
                self.samples_per_buffer()
            )));
        }
        Ok(())
    }

    /// Interleaved samples in one buffer: `frames_per_buffer * channels`.
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer as usize * self.channels as usize
    }

    /// Nominal duration of one buffer; the producer's pacing period.
    pub fn buffer_period(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_buffer as f64 / self.sample_rate.max(1) as f64)
    }

    /// Audio the ring can hold when full.
    pub fn ring_duration(&self) -> Duration {
        let frames = self.ring_capacity.saturating_sub(1) as f64 / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}
