//! Session status events.
//!
//! Every state transition of a `StreamSession` is broadcast as a
//! [`SessionStatusEvent`]. Subscribers that fall behind see
//! `RecvError::Lagged`; the session never waits for them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No backend, no ring.
    Closed,
    /// Backend activated and ring allocated; nothing running.
    Opened,
    /// Producer thread running and backend pulling.
    Streaming,
    /// Halted; ring retained so the session can restart without reallocating.
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Closed => "closed",
            SessionState::Opened => "opened",
            SessionState::Streaming => "streaming",
            SessionState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted on every state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusEvent {
    /// Monotonically increasing per session.
    pub seq: u64,
    pub state: SessionState,
    /// Optional human-readable detail (e.g. backend name).
    pub detail: Option<String>,
}
