//! # synthstream-core
//!
//! Real-time synthesized audio streaming.
//!
//! ## Architecture
//!
//! ```text
//! SynthSource::render ─► synth-producer thread ─► SPSC RingBuffer<f32>
//!    (paced by Clock, one chunk per period)              │
//!                                                  ConsumerBridge::pull
//!                                                        │
//!                                      AudioBackend thread (cpal / virtual)
//! ```
//!
//! Neither side of the ring blocks or allocates. A full ring drops the
//! producer's excess; an empty ring is padded with silence on the consumer
//! side. Both are counted in [`DiagnosticsSnapshot`].

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod synth;

// Convenience re-exports for downstream crates
pub use audio::{AudioBackend, CaptureBuffer, ConsumerBridge, CpalBackend, VirtualBackend};
pub use buffering::{RingBuffer, RingConsumer, RingMonitor, RingProducer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StreamConfig;
pub use engine::diagnostics::DiagnosticsSnapshot;
pub use engine::{open_session, StreamSession};
pub use error::{Result, StreamError};
pub use events::{SessionState, SessionStatusEvent};
pub use synth::{SineSource, SynthSource};
