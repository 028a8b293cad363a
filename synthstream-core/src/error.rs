use thiserror::Error;

use crate::events::SessionState;

/// All errors produced by synthstream-core.
///
/// Overrun and underrun are not errors: a short ring transfer is counted in
/// `StreamDiagnostics` instead.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("backend initialization failed: {0}")]
    Initialization(String),

    #[error("invalid stream config: {0}")]
    InvalidConfig(String),

    #[error("cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("ring capacity must be a power of two >= 2, got {0}")]
    InvalidCapacity(usize),

    #[error("ring buffer handles from a previous split are still alive")]
    RingInUse,

    #[error("audio backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StreamError {
    /// True for errors that leave the session exactly as it was.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidState { .. } | StreamError::RingInUse | StreamError::Backend(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
