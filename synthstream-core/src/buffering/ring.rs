//! Bounded single-producer / single-consumer ring.
//!
//! ## Algorithm
//!
//! Both cursors are free-running counters; only their use as a storage index
//! is wrapped, via `cursor & mask`. One slot is kept empty so that
//! `write == read` always means "empty" and `write - read == capacity - 1`
//! means "full".
//!
//! ```text
//! producer: write (relaxed) ─┐            ┌─ read (relaxed)  :consumer
//!           read  (acquire) ─┤  storage   ├─ write (acquire)
//!           copy, then       │            │  copy, then
//!           write (release) ─┘            └─ read (release)
//! ```
//!
//! Each side is the sole writer of its own cursor, so there is no CAS on the
//! data path. The acquire load of the other side's cursor pairs with that
//! side's release store, which is what makes the copied slots visible.
//!
//! Single-writer / single-reader is enforced by construction: a
//! [`RingBuffer`] hands out exactly one [`RingProducer`] and one
//! [`RingConsumer`] per split, and refuses to split again while either of
//! them is alive.

#![allow(unsafe_code)]

use std::fmt;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crossbeam_utils::CachePadded;

use super::storage::AlignedStorage;
use crate::error::{Result, StreamError};

struct Shared<T> {
    /// Advanced only by the producer.
    write: CachePadded<AtomicUsize>,
    /// Advanced only by the consumer.
    read: CachePadded<AtomicUsize>,
    /// Producer + consumer handles currently alive (0 or 2, transiently 1).
    live_handles: AtomicUsize,
    mask: usize,
    storage: AlignedStorage<T>,
}

impl<T> Shared<T> {
    #[inline]
    fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Occupancy as seen by a third party. `read` is loaded first so the
    /// difference can never be negative; it may transiently overshoot while
    /// both sides move, hence the clamp.
    #[inline]
    fn observed_available(&self) -> usize {
        let read = self.read.load(Ordering::Acquire);
        let write = self.write.load(Ordering::Acquire);
        write.wrapping_sub(read).min(self.mask)
    }
}

/// Owner of the ring storage. Allocated once, never resized.
pub struct RingBuffer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy + Default + Send> RingBuffer<T> {
    /// Allocate a ring with `capacity` slots (`capacity - 1` usable).
    ///
    /// # Errors
    /// `StreamError::InvalidCapacity` unless `capacity` is a power of two
    /// `>= 2` and `T` is not zero-sized.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(StreamError::InvalidCapacity(capacity));
        }
        let storage =
            AlignedStorage::new(capacity).ok_or(StreamError::InvalidCapacity(capacity))?;

        Ok(Self {
            shared: Arc::new(Shared {
                write: CachePadded::new(AtomicUsize::new(0)),
                read: CachePadded::new(AtomicUsize::new(0)),
                live_handles: AtomicUsize::new(0),
                mask: capacity - 1,
                storage,
            }),
        })
    }

    /// Hand out the producer and consumer halves.
    ///
    /// Anything left over from a previous split is discarded, so a restarted
    /// stream never replays stale audio.
    ///
    /// # Errors
    /// `StreamError::RingInUse` while a handle from an earlier split is alive.
    pub fn split(&self) -> Result<(RingProducer<T>, RingConsumer<T>)> {
        self.shared
            .live_handles
            .compare_exchange(0, 2, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StreamError::RingInUse)?;

        // No handle is alive: nothing else can be touching the cursors.
        let write = self.shared.write.load(Ordering::Relaxed);
        self.shared.read.store(write, Ordering::Relaxed);

        Ok((
            RingProducer {
                shared: Arc::clone(&self.shared),
            },
            RingConsumer {
                shared: Arc::clone(&self.shared),
            },
        ))
    }
}

impl<T> RingBuffer<T> {
    /// Total slots, including the reserved one.
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn available(&self) -> usize {
        self.shared.observed_available()
    }

    pub fn free_space(&self) -> usize {
        self.shared.mask - self.shared.observed_available()
    }

    /// `true` while the producer or consumer of the current split is alive.
    pub fn is_split(&self) -> bool {
        self.shared.live_handles.load(Ordering::Acquire) != 0
    }

    /// Read-only view for monitoring fill level from any thread.
    pub fn monitor(&self) -> RingMonitor<T> {
        RingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .field("split", &self.is_split())
            .finish()
    }
}

/// Write half. `Send`, not `Clone`: exactly one producer thread.
pub struct RingProducer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> RingProducer<T> {
    /// Enqueue as much of `source` as fits, in order.
    ///
    /// Returns the number of samples written, `min(source.len(), free_space())`.
    /// Samples not yet read are never overwritten.
    pub fn push(&mut self, source: &[T]) -> usize {
        let shared = &*self.shared;
        let write = shared.write.load(Ordering::Relaxed);
        let read = shared.read.load(Ordering::Acquire);

        let free = shared.mask - write.wrapping_sub(read);
        let count = source.len().min(free);
        if count == 0 {
            return 0;
        }

        let start = write & shared.mask;
        let first = count.min(shared.capacity() - start);

        // SAFETY: slots [write, write + count) are free. The consumer released
        // them (acquire load of `read` above) and will not touch them until
        // the release store of `write` below. Both segments are in bounds:
        // `start + first <= capacity` and `count - first <= start`.
        unsafe {
            shared.storage.write_slots(start, &source[..first]);
            shared.storage.write_slots(0, &source[first..count]);
        }

        shared.write.store(write.wrapping_add(count), Ordering::Release);
        count
    }

    pub fn available(&self) -> usize {
        let write = self.shared.write.load(Ordering::Relaxed);
        let read = self.shared.read.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn free_space(&self) -> usize {
        self.shared.mask - self.available()
    }
}

impl<T> RingProducer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> Drop for RingProducer<T> {
    fn drop(&mut self) {
        self.shared.live_handles.fetch_sub(1, Ordering::Release);
    }
}

/// Read half. `Send`, not `Clone`: exactly one consumer thread.
pub struct RingConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Copy> RingConsumer<T> {
    /// Dequeue up to `destination.len()` samples, in order.
    ///
    /// Returns the number read. The tail of `destination` beyond that count
    /// is left untouched; zero-filling a short read is the caller's job.
    pub fn pop(&mut self, destination: &mut [T]) -> usize {
        let shared = &*self.shared;
        let read = shared.read.load(Ordering::Relaxed);
        let write = shared.write.load(Ordering::Acquire);

        let count = destination.len().min(write.wrapping_sub(read));
        if count == 0 {
            return 0;
        }

        let start = read & shared.mask;
        let first = count.min(shared.capacity() - start);

        // SAFETY: slots [read, read + count) were published by the producer's
        // release store of `write` (acquired above) and it will not reuse them
        // until the release store of `read` below.
        unsafe {
            let (head, tail) = destination[..count].split_at_mut(first);
            shared.storage.read_slots(start, head);
            shared.storage.read_slots(0, tail);
        }

        shared.read.store(read.wrapping_add(count), Ordering::Release);
        count
    }

    pub fn available(&self) -> usize {
        let read = self.shared.read.load(Ordering::Relaxed);
        let write = self.shared.write.load(Ordering::Acquire);
        write.wrapping_sub(read)
    }

    pub fn free_space(&self) -> usize {
        self.shared.mask - self.available()
    }
}

impl<T> RingConsumer<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }
}

impl<T> Drop for RingConsumer<T> {
    fn drop(&mut self) {
        self.shared.live_handles.fetch_sub(1, Ordering::Release);
    }
}

/// Cloneable, read-only fill-level probe.
pub struct RingMonitor<T> {
    shared: Arc<Shared<T>>,
}

impl<T> RingMonitor<T> {
    pub fn capacity(&self) -> usize {
        self.shared.capacity()
    }

    pub fn available(&self) -> usize {
        self.shared.observed_available()
    }

    pub fn free_space(&self) -> usize {
        self.shared.mask - self.shared.observed_available()
    }
}

impl<T> Clone for RingMonitor<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for RingMonitor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingMonitor")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn ring(capacity: usize) -> (RingBuffer<u32>, RingProducer<u32>, RingConsumer<u32>) {
        let ring = RingBuffer::new(capacity).expect("valid capacity");
        let (producer, consumer) = ring.split().expect("first split");
        (ring, producer, consumer)
    }

    #[test]
    fn capacity_eight_worked_example() {
        let (_ring, mut producer, mut consumer) = ring(8);
        assert_eq!(producer.free_space(), 7);

        assert_eq!(producer.push(&[10, 11, 12, 13, 14]), 5);
        assert_eq!(consumer.available(), 5);
        assert_eq!(producer.free_space(), 2);

        let mut out = [0u32; 3];
        assert_eq!(consumer.pop(&mut out), 3);
        assert_eq!(out, [10, 11, 12]);
        assert_eq!(consumer.available(), 2);
    }

    #[test]
    fn round_trip_preserves_order_and_values() {
        let (_ring, mut producer, mut consumer) = ring(64);
        let input: Vec<u32> = (0..63).map(|i| i * 3 + 1).collect();
        assert_eq!(producer.push(&input), 63);

        let mut out = vec![0u32; 63];
        assert_eq!(consumer.pop(&mut out), 63);
        assert_eq!(out, input);
        assert_eq!(consumer.available(), 0);
    }

    #[test]
    fn pop_from_empty_leaves_destination_untouched() {
        let (_ring, _producer, mut consumer) = ring(16);
        let mut out = [42u32; 4];
        assert_eq!(consumer.pop(&mut out), 0);
        assert_eq!(out, [42; 4]);
    }

    #[test]
    fn short_pop_leaves_tail_untouched() {
        let (_ring, mut producer, mut consumer) = ring(16);
        producer.push(&[1, 2]);
        let mut out = [9u32; 5];
        assert_eq!(consumer.pop(&mut out), 2);
        assert_eq!(out, [1, 2, 9, 9, 9]);
    }

    #[test]
    fn overfull_push_accepts_exactly_free_space() {
        let (_ring, mut producer, mut consumer) = ring(16);
        producer.push(&[0; 10]);
        let mut drain = [0u32; 4];
        consumer.pop(&mut drain);

        let free = producer.free_space();
        assert_eq!(free, 15 - 6);
        let before = consumer.available();
        let accepted = producer.push(&[7; 32]);
        assert_eq!(accepted, free);

        let mut out = vec![0u32; 64];
        assert_eq!(consumer.pop(&mut out), before + accepted);
        assert_eq!(producer.push(&[1; 20]), 15);
        assert_eq!(producer.push(&[1]), 0);
    }

    #[test]
    fn wraps_around_the_storage_boundary() {
        let (_ring, mut producer, mut consumer) = ring(8);
        let mut out = [0u32; 8];
        let mut next = 0u32;
        let mut expected = 0u32;

        for _ in 0..50 {
            let batch: Vec<u32> = (next..next + 5).collect();
            assert_eq!(producer.push(&batch), 5);
            next += 5;

            let n = consumer.pop(&mut out[..5]);
            assert_eq!(n, 5);
            for value in &out[..n] {
                assert_eq!(*value, expected);
                expected += 1;
            }
        }
    }

    #[test]
    fn rejects_invalid_capacities() {
        for capacity in [0usize, 1, 3, 6, 100] {
            assert!(matches!(
                RingBuffer::<f32>::new(capacity),
                Err(StreamError::InvalidCapacity(c)) if c == capacity
            ));
        }
        assert!(RingBuffer::<f32>::new(2).is_ok());
    }

    #[test]
    fn split_is_refused_while_a_handle_is_alive() {
        let ring = RingBuffer::<f32>::new(8).unwrap();
        let (producer, consumer) = ring.split().unwrap();
        assert!(ring.is_split());
        assert!(matches!(ring.split(), Err(StreamError::RingInUse)));

        drop(producer);
        assert!(matches!(ring.split(), Err(StreamError::RingInUse)));

        drop(consumer);
        assert!(!ring.is_split());
        assert!(ring.split().is_ok());
    }

    #[test]
    fn resplit_discards_leftover_samples() {
        let ring = RingBuffer::<u32>::new(8).unwrap();
        {
            let (mut producer, _consumer) = ring.split().unwrap();
            producer.push(&[1, 2, 3]);
        }
        assert_eq!(ring.available(), 3);

        let (mut producer, mut consumer) = ring.split().unwrap();
        assert_eq!(consumer.available(), 0);
        assert_eq!(producer.free_space(), 7);

        producer.push(&[4]);
        let mut out = [0u32; 2];
        assert_eq!(consumer.pop(&mut out), 1);
        assert_eq!(out[0], 4);
    }

    #[test]
    fn monitor_tracks_fill_level() {
        let (ring, mut producer, mut consumer) = ring(32);
        let monitor = ring.monitor().clone();
        producer.push(&[1; 12]);
        assert_eq!(monitor.available(), 12);
        assert_eq!(monitor.free_space(), 19);

        let mut out = [0u32; 5];
        consumer.pop(&mut out);
        assert_eq!(monitor.available(), 7);
        assert_eq!(monitor.capacity(), 32);
    }

    #[test]
    fn random_transfers_hold_invariants() {
        let (_ring, mut producer, mut consumer) = ring(64);
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut pushed_total = 0u64;
        let mut popped_total = 0u64;
        let mut next = 0u32;
        let mut expected = 0u32;
        let mut scratch = vec![0u32; 100];

        for _ in 0..10_000 {
            if rng.gen_bool(0.5) {
                let len = rng.gen_range(0..100);
                let batch: Vec<u32> = (next..next + len as u32).collect();
                let free = producer.free_space();
                let n = producer.push(&batch);
                assert_eq!(n, len.min(free));
                next += n as u32;
                pushed_total += n as u64;
            } else {
                let len = rng.gen_range(0..100);
                let available = consumer.available();
                let n = consumer.pop(&mut scratch[..len]);
                assert_eq!(n, len.min(available));
                for value in &scratch[..n] {
                    assert_eq!(*value, expected);
                    expected += 1;
                }
                popped_total += n as u64;
            }

            assert!(popped_total <= pushed_total);
            let available = consumer.available();
            assert!(available <= 63);
            assert_eq!(available + producer.free_space(), 63);
        }
    }
}
