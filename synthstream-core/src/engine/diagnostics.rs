//! Overrun / underrun counters.
//!
//! Drop-on-overrun and silence-on-underrun stay silent on the audio path;
//! these relaxed counters are how a monitor observes them. Recording is a
//! handful of `fetch_add`s: no allocation, no locking, no logging.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct StreamDiagnostics {
    pub producer_iterations: AtomicU64,
    pub samples_rendered: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub overrun_events: AtomicU64,
    pub pull_calls: AtomicU64,
    pub samples_delivered: AtomicU64,
    pub samples_zero_filled: AtomicU64,
    pub underrun_events: AtomicU64,
}

impl StreamDiagnostics {
    pub fn reset(&self) {
        self.producer_iterations.store(0, Ordering::Relaxed);
        self.samples_rendered.store(0, Ordering::Relaxed);
        self.samples_dropped.store(0, Ordering::Relaxed);
        self.overrun_events.store(0, Ordering::Relaxed);
        self.pull_calls.store(0, Ordering::Relaxed);
        self.samples_delivered.store(0, Ordering::Relaxed);
        self.samples_zero_filled.store(0, Ordering::Relaxed);
        self.underrun_events.store(0, Ordering::Relaxed);
    }

    /// One producer iteration: `rendered` samples offered, `pushed` accepted.
    #[inline]
    pub fn record_push(&self, rendered: usize, pushed: usize) {
        self.samples_rendered
            .fetch_add(rendered as u64, Ordering::Relaxed);
        if pushed < rendered {
            self.samples_dropped
                .fetch_add((rendered - pushed) as u64, Ordering::Relaxed);
            self.overrun_events.fetch_add(1, Ordering::Relaxed);
        }
        // Release: observing the iteration count makes this iteration's
        // ring push and counters visible too.
        self.producer_iterations.fetch_add(1, Ordering::Release);
    }

    /// One pull: `requested` samples owed to the backend, `delivered` popped.
    #[inline]
    pub fn record_pull(&self, requested: usize, delivered: usize) {
        self.samples_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        if delivered < requested {
            self.samples_zero_filled
                .fetch_add((requested - delivered) as u64, Ordering::Relaxed);
            self.underrun_events.fetch_add(1, Ordering::Relaxed);
        }
        self.pull_calls.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let producer_iterations = self.producer_iterations.load(Ordering::Acquire);
        let pull_calls = self.pull_calls.load(Ordering::Acquire);
        DiagnosticsSnapshot {
            producer_iterations,
            samples_rendered: self.samples_rendered.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            overrun_events: self.overrun_events.load(Ordering::Relaxed),
            pull_calls,
            samples_delivered: self.samples_delivered.load(Ordering::Relaxed),
            samples_zero_filled: self.samples_zero_filled.load(Ordering::Relaxed),
            underrun_events: self.underrun_events.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub producer_iterations: u64,
    pub samples_rendered: u64,
    pub samples_dropped: u64,
    pub overrun_events: u64,
    pub pull_calls: u64,
    pub samples_delivered: u64,
    pub samples_zero_filled: u64,
    pub underrun_events: u64,
}

impl DiagnosticsSnapshot {
    /// Samples that made it into the ring.
    pub fn samples_pushed(&self) -> u64 {
        self.samples_rendered - self.samples_dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_shortfall_counts_as_overrun() {
        let diagnostics = StreamDiagnostics::default();
        diagnostics.record_push(512, 512);
        diagnostics.record_push(512, 100);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.producer_iterations, 2);
        assert_eq!(snap.samples_rendered, 1024);
        assert_eq!(snap.samples_dropped, 412);
        assert_eq!(snap.overrun_events, 1);
        assert_eq!(snap.samples_pushed(), 612);
    }

    #[test]
    fn pull_shortfall_counts_as_underrun() {
        let diagnostics = StreamDiagnostics::default();
        diagnostics.record_pull(256, 0);
        diagnostics.record_pull(256, 256);

        let snap = diagnostics.snapshot();
        assert_eq!(snap.pull_calls, 2);
        assert_eq!(snap.samples_delivered, 256);
        assert_eq!(snap.samples_zero_filled, 256);
        assert_eq!(snap.underrun_events, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let diagnostics = StreamDiagnostics::default();
        diagnostics.record_push(10, 5);
        diagnostics.record_pull(10, 5);
        diagnostics.reset();
        assert_eq!(diagnostics.snapshot(), DiagnosticsSnapshot::default());
    }
}
