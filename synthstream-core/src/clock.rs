//! Pacing time sources.
//!
//! The producer loop is open-loop: it waits one nominal buffer period per
//! iteration instead of listening to hardware feedback. Hiding that wait
//! behind [`Clock`] lets tests step the loop tick by tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// How often a [`ManualClock`] waiter re-checks the running flag.
const MANUAL_POLL: Duration = Duration::from_millis(2);

/// Source of pacing for producer and virtual-device loops.
pub trait Clock: Send + Sync + 'static {
    /// Wait for one `period`.
    ///
    /// Returns `false` once `running` has been lowered, telling the caller to
    /// exit its loop. Implementations must return within roughly one
    /// `period` of the flag being lowered.
    fn pace(&self, period: Duration, running: &AtomicBool) -> bool;
}

/// Wall-clock pacing via `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn pace(&self, period: Duration, running: &AtomicBool) -> bool {
        if !running.load(Ordering::Acquire) {
            return false;
        }
        thread::sleep(period);
        running.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct ManualState {
    pending: u64,
    consumed: u64,
    elapsed: Duration,
}

/// Test clock: every `pace` call consumes one tick released by [`advance`].
///
/// No wall-clock time passes between ticks, so a loop driven by this clock
/// runs exactly as many iterations as the test allows.
///
/// [`advance`]: ManualClock::advance
#[derive(Debug, Default)]
pub struct ManualClock {
    state: Mutex<ManualState>,
    ticked: Condvar,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release `ticks` more pacing periods.
    pub fn advance(&self, ticks: u64) {
        self.state.lock().pending += ticks;
        self.ticked.notify_all();
    }

    /// Ticks consumed by `pace` so far.
    pub fn consumed(&self) -> u64 {
        self.state.lock().consumed
    }

    /// Simulated time: the sum of the periods of all consumed ticks.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }
}

impl Clock for ManualClock {
    fn pace(&self, period: Duration, running: &AtomicBool) -> bool {
        let mut state = self.state.lock();
        loop {
            if !running.load(Ordering::Acquire) {
                return false;
            }
            if state.pending > 0 {
                state.pending -= 1;
                state.consumed += 1;
                state.elapsed += period;
                return true;
            }
            self.ticked.wait_for(&mut state, MANUAL_POLL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn system_clock_stops_when_flag_is_down() {
        let running = AtomicBool::new(false);
        let start = Instant::now();
        assert!(!SystemClock.pace(Duration::from_secs(5), &running));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn system_clock_sleeps_one_period() {
        let running = AtomicBool::new(true);
        let start = Instant::now();
        assert!(SystemClock.pace(Duration::from_millis(10), &running));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn manual_clock_releases_exactly_the_advanced_ticks() {
        let clock = Arc::new(ManualClock::new());
        let running = Arc::new(AtomicBool::new(true));
        clock.advance(3);

        let period = Duration::from_millis(5);
        for _ in 0..3 {
            assert!(clock.pace(period, &running));
        }
        assert_eq!(clock.consumed(), 3);
        assert_eq!(clock.elapsed(), Duration::from_millis(15));

        let waiter = {
            let clock = Arc::clone(&clock);
            let running = Arc::clone(&running);
            std::thread::spawn(move || clock.pace(period, &running))
        };
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.consumed(), 3, "no tick was available");

        running.store(false, Ordering::Release);
        assert!(!waiter.join().expect("waiter panicked"));
    }
}
