//! `StreamSession`: top-level lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! StreamSession::new()               Closed
//!     └─► open()                     Opened     backend activated, ring allocated
//!         └─► start(source)          Streaming  producer spawned, backend pulling
//!             └─► stop()             Stopped    producer joined, bridge dropped
//!                 └─► start(source)  Streaming  same ring, no reallocation
//! close() from any state ──────────► Closed     ring and backend released
//! ```
//!
//! Misuse (`start` while streaming, `open` twice, ...) returns
//! `StreamError::InvalidState` and changes nothing. `stop` outside
//! `Streaming` is a successful no-op.
//!
//! ## Threading
//!
//! Exactly two threads touch the ring: the `synth-producer` thread this
//! session spawns, and whatever thread the backend pulls from. The session
//! owns one producer thread at a time and the ring refuses a second split,
//! so single-producer / single-consumer holds by construction.

pub mod diagnostics;
pub mod producer;

use std::sync::{atomic::AtomicBool, Arc};

use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{AudioBackend, ConsumerBridge},
    buffering::{create_audio_ring, AudioRing, RingMonitor},
    clock::{Clock, SystemClock},
    config::StreamConfig,
    error::{Result, StreamError},
    events::{SessionState, SessionStatusEvent},
    synth::SynthSource,
};

use self::diagnostics::{DiagnosticsSnapshot, StreamDiagnostics};
use self::producer::{ProducerContext, ProducerHandle};

/// Broadcast channel capacity: status events buffered for slow subscribers.
const STATUS_CHANNEL_CAP: usize = 32;

/// One independent audio stream: ring, producer thread and backend.
///
/// Sessions share nothing with each other, so any number can coexist.
pub struct StreamSession {
    config: StreamConfig,
    state: SessionState,
    backend: Box<dyn AudioBackend>,
    clock: Arc<dyn Clock>,
    /// Present from `open` until `close`.
    ring: Option<AudioRing>,
    /// Present only while `Streaming`.
    producer: Option<ProducerHandle>,
    diagnostics: Arc<StreamDiagnostics>,
    status_tx: broadcast::Sender<SessionStatusEvent>,
    seq: u64,
}

impl StreamSession {
    /// Create a closed session paced by the wall clock.
    pub fn new(config: StreamConfig, backend: impl AudioBackend + 'static) -> Self {
        Self::with_clock(config, backend, Arc::new(SystemClock))
    }

    /// Create a closed session with an injected pacing clock.
    pub fn with_clock(
        config: StreamConfig,
        backend: impl AudioBackend + 'static,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAP);
        Self {
            config,
            state: SessionState::Closed,
            backend: Box::new(backend),
            clock,
            ring: None,
            producer: None,
            diagnostics: Arc::new(StreamDiagnostics::default()),
            status_tx,
            seq: 0,
        }
    }

    /// Closed → Opened: validate the config, activate the backend and
    /// allocate the ring.
    ///
    /// # Errors
    /// - `StreamError::InvalidState` unless the session is `Closed`.
    /// - `StreamError::InvalidConfig` for an out-of-range config.
    /// - `StreamError::Initialization` when the backend cannot be acquired.
    ///
    /// On error the session stays `Closed`; nothing is retried.
    pub fn open(&mut self) -> Result<()> {
        if self.state != SessionState::Closed {
            return Err(self.invalid_state("open"));
        }
        self.config.validate()?;

        if let Err(e) = self.backend.activate(&self.config) {
            warn!(backend = self.backend.name(), "backend activation failed: {e}");
            return Err(match e {
                StreamError::Initialization(_) => e,
                other => StreamError::Initialization(other.to_string()),
            });
        }

        let ring = match create_audio_ring(self.config.ring_capacity) {
            Ok(ring) => ring,
            Err(e) => {
                self.backend.release();
                return Err(e);
            }
        };

        info!(
            backend = self.backend.name(),
            sample_rate = self.config.sample_rate,
            channels = self.config.channels,
            frames_per_buffer = self.config.frames_per_buffer,
            ring_capacity = ring.capacity(),
            "stream session opened"
        );
        self.ring = Some(ring);
        let backend = self.backend.name().to_string();
        self.set_state(SessionState::Opened, Some(backend));
        Ok(())
    }

    /// Opened|Stopped → Streaming with `source` as the synthesizer.
    ///
    /// # Errors
    /// - `StreamError::InvalidState` when `Closed` or already `Streaming`.
    /// - Backend errors from `register_pull` / `start`; the producer is
    ///   stopped again and the state is unchanged.
    pub fn start(&mut self, source: impl SynthSource) -> Result<()> {
        self.start_boxed(Box::new(source))
    }

    /// [`start`](Self::start) for an already boxed source.
    pub fn start_boxed(&mut self, source: Box<dyn SynthSource>) -> Result<()> {
        if !matches!(self.state, SessionState::Opened | SessionState::Stopped) {
            return Err(self.invalid_state("start"));
        }
        let Some(ring) = self.ring.as_ref() else {
            return Err(self.invalid_state("start"));
        };

        self.diagnostics.reset();
        let (producer, consumer) = ring.split()?;

        let bridge = ConsumerBridge::new(
            consumer,
            self.config.channels,
            Arc::clone(&self.diagnostics),
        );
        self.backend.register_pull(bridge)?;

        let ctx = ProducerContext::new(
            &self.config,
            producer,
            source,
            Arc::clone(&self.clock),
            Arc::new(AtomicBool::new(true)),
            Arc::clone(&self.diagnostics),
        );
        let handle = match ProducerHandle::spawn(ctx) {
            Ok(handle) => handle,
            Err(e) => {
                self.backend.stop();
                return Err(e);
            }
        };

        if let Err(e) = self.backend.start() {
            error!(backend = self.backend.name(), "backend failed to start: {e}");
            handle.signal_stop();
            self.backend.stop();
            handle.stop();
            return Err(e);
        }

        info!("stream session streaming");
        self.producer = Some(handle);
        self.set_state(SessionState::Streaming, None);
        Ok(())
    }

    /// Streaming → Stopped. Outside `Streaming` this is a no-op that
    /// succeeds without touching any thread.
    ///
    /// Blocks until the producer observes the flag, at most one pacing period.
    pub fn stop(&mut self) -> Result<()> {
        if self.state != SessionState::Streaming {
            debug!(state = %self.state, "stop ignored: not streaming");
            return Ok(());
        }

        let producer = self.producer.take();
        if let Some(handle) = &producer {
            handle.signal_stop();
        }
        self.backend.stop();
        if let Some(handle) = producer {
            handle.stop();
        }

        let snap = self.diagnostics.snapshot();
        info!(
            dropped = snap.samples_dropped,
            zero_filled = snap.samples_zero_filled,
            "stream session stopped"
        );
        self.set_state(SessionState::Stopped, None);
        Ok(())
    }

    /// Any state → Closed, stopping first if streaming. Releases the ring and
    /// the backend. Always succeeds.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Streaming {
            self.stop()?;
        }
        if self.state == SessionState::Closed {
            return Ok(());
        }

        self.backend.release();
        self.ring = None;
        info!("stream session closed");
        self.set_state(SessionState::Closed, None);
        Ok(())
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Snapshot of the overrun / underrun counters for the current (or last)
    /// streaming run.
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    /// Fill-level probe for the ring; `None` while closed.
    pub fn ring_monitor(&self) -> Option<RingMonitor<f32>> {
        self.ring.as_ref().map(AudioRing::monitor)
    }

    /// Subscribe to state-change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SessionStatusEvent> {
        self.status_tx.subscribe()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn invalid_state(&self, operation: &'static str) -> StreamError {
        StreamError::InvalidState {
            operation,
            state: self.state,
        }
    }

    fn set_state(&mut self, state: SessionState, detail: Option<String>) {
        self.state = state;
        let _ = self.status_tx.send(SessionStatusEvent {
            seq: self.seq,
            state,
            detail,
        });
        self.seq += 1;
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .field("backend", &self.backend.name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Create a session for `config` on `backend` and open it in one call.
///
/// # Errors
/// Same as [`StreamSession::open`].
pub fn open_session(
    config: StreamConfig,
    backend: impl AudioBackend + 'static,
) -> Result<StreamSession> {
    let mut session = StreamSession::new(config, backend);
    session.open()?;
    Ok(session)
}
