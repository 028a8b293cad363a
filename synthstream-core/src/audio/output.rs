//! Audio output via the cpal backend.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on
//! macOS). `CpalBackend` therefore never holds one: `start` spawns a
//! dedicated `cpal-output` thread that builds, plays and finally drops the
//! stream, and reports the open result back through a one-shot channel.
//! `stop` wakes that thread over a crossbeam channel and joins it.
//!
//! Format conversion is out of scope: the device must accept interleaved
//! f32 at the requested rate and channel count, otherwise activation fails.

use std::thread::JoinHandle;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    SampleFormat, SampleRate,
};

use super::{AudioBackend, ConsumerBridge};
use crate::config::StreamConfig;
use crate::error::{Result, StreamError};
#[cfg(feature = "audio-cpal")]
use tracing::{debug, error, info, warn};

struct OutputWorker {
    stop_tx: crossbeam_channel::Sender<()>,
    handle: JoinHandle<()>,
}

/// Default (or named) output device through cpal.
pub struct CpalBackend {
    preferred_device: Option<String>,
    config: Option<StreamConfig>,
    bridge: Option<ConsumerBridge>,
    worker: Option<OutputWorker>,
}

impl CpalBackend {
    /// Use the host's default output device.
    pub fn new() -> Self {
        Self {
            preferred_device: None,
            config: None,
            bridge: None,
            worker: None,
        }
    }

    /// Prefer the output device with this exact name, falling back to the
    /// default device when it is not present.
    pub fn with_device_name(name: impl Into<String>) -> Self {
        let mut backend = Self::new();
        backend.preferred_device = Some(name.into());
        backend
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "audio-cpal")]
fn select_device(preferred: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(preferred_name) = preferred {
        match host.output_devices() {
            Ok(mut devices) => {
                let found = devices.find(|device| {
                    device
                        .name()
                        .map(|name| name == preferred_name)
                        .unwrap_or(false)
                });
                if let Some(device) = found {
                    return Ok(device);
                }
                warn!(
                    "preferred output device '{}' not found, falling back",
                    preferred_name
                );
            }
            Err(e) => {
                warn!("failed to list output devices while resolving preference: {e}");
            }
        }
    }

    host.default_output_device()
        .ok_or_else(|| StreamError::Initialization("no default output device found".into()))
}

#[cfg(feature = "audio-cpal")]
fn build_stream(
    preferred: Option<&str>,
    config: &StreamConfig,
    mut bridge: ConsumerBridge,
) -> Result<cpal::Stream> {
    let device = select_device(preferred)?;
    let stream_config = cpal::StreamConfig {
        channels: config.channels,
        sample_rate: SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| bridge.fill(data),
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| StreamError::Backend(e.to_string()))
}

#[cfg(feature = "audio-cpal")]
impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn activate(&mut self, config: &StreamConfig) -> Result<()> {
        let device = select_device(self.preferred_device.as_deref())?;
        let device_name = device.name().unwrap_or_default();

        let supported = device
            .supported_output_configs()
            .map_err(|e| StreamError::Initialization(e.to_string()))?
            .any(|range| {
                range.sample_format() == SampleFormat::F32
                    && range.channels() == config.channels
                    && range.min_sample_rate().0 <= config.sample_rate
                    && config.sample_rate <= range.max_sample_rate().0
            });

        if !supported {
            return Err(StreamError::Initialization(format!(
                "device '{}' has no f32 output config for {} ch @ {} Hz",
                device_name, config.channels, config.sample_rate
            )));
        }

        info!(
            device = device_name.as_str(),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "output device activated"
        );
        self.config = Some(config.clone());
        Ok(())
    }

    fn register_pull(&mut self, bridge: ConsumerBridge) -> Result<()> {
        if self.config.is_none() {
            return Err(StreamError::Backend("output device is not activated".into()));
        }
        self.bridge = Some(bridge);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Err(StreamError::Backend("output stream already running".into()));
        }
        let config = self
            .config
            .clone()
            .ok_or_else(|| StreamError::Backend("output device is not activated".into()))?;
        let bridge = self
            .bridge
            .take()
            .ok_or_else(|| StreamError::Backend("no pull function registered".into()))?;
        let preferred = self.preferred_device.clone();

        // Sync oneshot: output thread signals open success/failure to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("cpal-output".into())
            .spawn(move || {
                // ── Build the stream on THIS thread (cpal::Stream is !Send) ──
                let stream = match build_stream(preferred.as_deref(), &config, bridge) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = open_tx.send(Err(e));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = open_tx.send(Err(StreamError::Backend(e.to_string())));
                    return;
                }
                let _ = open_tx.send(Ok(()));

                // Park until stop() (or the backend is dropped).
                let _ = stop_rx.recv();
                drop(stream);
                debug!("cpal output stream released");
            })?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                info!("cpal output stream playing");
                self.worker = Some(OutputWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent: the thread panicked.
                let _ = handle.join();
                Err(StreamError::Backend(
                    "output thread died before opening the stream".into(),
                ))
            }
        }
    }

    fn stop(&mut self) {
        self.bridge = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.handle.join().is_err() {
                error!("cpal output thread panicked");
            }
            info!("cpal output stream stopped");
        }
    }

    fn release(&mut self) {
        self.stop();
        self.config = None;
    }
}

/// Stub when the `audio-cpal` feature is disabled.
#[cfg(not(feature = "audio-cpal"))]
impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn activate(&mut self, _config: &StreamConfig) -> Result<()> {
        Err(StreamError::Initialization(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn register_pull(&mut self, _bridge: ConsumerBridge) -> Result<()> {
        Err(StreamError::Backend("compiled without audio-cpal feature".into()))
    }

    fn start(&mut self) -> Result<()> {
        Err(StreamError::Backend("compiled without audio-cpal feature".into()))
    }

    fn stop(&mut self) {
        self.bridge = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }

    fn release(&mut self) {
        self.stop();
        self.config = None;
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.release();
    }
}
