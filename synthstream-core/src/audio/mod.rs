//! Audio output backends.
//!
//! # Design constraints
//!
//! A backend owns the hardware-paced thread that consumes audio. On that
//! thread it calls [`ConsumerBridge::fill`] / [`ConsumerBridge::pull`] and
//! nothing else from the core: the bridge never allocates, blocks or logs,
//! so it is safe at elevated (TIME_CRITICAL on Windows) priority.
//!
//! The core only needs the narrow [`AudioBackend`] contract, so it never
//! assumes a particular native audio API:
//!
//! ```text
//! open()  ──► activate(config)
//! start() ──► register_pull(bridge) ──► start()
//! stop()  ──► stop()        (bridge dropped, ring consumer released)
//! close() ──► release()
//! ```

pub mod bridge;
pub mod output;
pub mod virtual_device;

pub use bridge::ConsumerBridge;
pub use output::CpalBackend;
pub use virtual_device::{CaptureBuffer, VirtualBackend};

use crate::config::StreamConfig;
use crate::error::Result;

/// Contract for the external device side of a stream.
pub trait AudioBackend: Send {
    /// Short name for logs and status events.
    fn name(&self) -> &str;

    /// Acquire the device and check it accepts interleaved f32 at `config`.
    ///
    /// # Errors
    /// `StreamError::Initialization` when the device is missing or the format
    /// is not supported.
    fn activate(&mut self, config: &StreamConfig) -> Result<()>;

    /// Hand over the pull function for the next `start`.
    fn register_pull(&mut self, bridge: ConsumerBridge) -> Result<()>;

    /// Begin calling the registered bridge from the hardware thread.
    fn start(&mut self) -> Result<()>;

    /// Stop calling the bridge and drop it. Idempotent.
    fn stop(&mut self);

    /// Give the device back. Stops first if needed. Idempotent.
    fn release(&mut self);
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn activate(&mut self, config: &StreamConfig) -> Result<()> {
        (**self).activate(config)
    }

    fn register_pull(&mut self, bridge: ConsumerBridge) -> Result<()> {
        (**self).register_pull(bridge)
    }

    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
