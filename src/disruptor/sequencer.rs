//! Sequencer Implementation
//!
//! Sequencers hand out claims on ring buffer slots and publish them. They own the
//! cursor and the set of gating sequences, and enforce that a producer never wraps
//! onto a slot that the slowest gating consumer has not finished with:
//! `claim - buffer_size <= min(gating_sequences)` holds before any claim is granted.

use crate::disruptor::{
    get_minimum_sequence, DisruptorError, Result, Sequence, WaitStrategy, INITIAL_CURSOR_VALUE,
};
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::{fence, AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

/// Claims and publishes sequences on behalf of producers
pub trait Sequencer: Send + Sync + std::fmt::Debug {
    /// The cursor sequence
    ///
    /// For a single producer this is the highest published sequence; for multiple
    /// producers it is the highest *claimed* sequence, and availability must be
    /// checked per slot.
    fn cursor(&self) -> Arc<Sequence>;

    /// The size of the ring buffer
    fn buffer_size(&self) -> i64;

    /// The wait strategy consumers use to idle on this sequencer
    fn wait_strategy(&self) -> Arc<dyn WaitStrategy>;

    /// Whether `required_capacity` slots could be claimed right now
    ///
    /// Concurrent: only an indication.
    fn has_available_capacity(&self, required_capacity: i64) -> bool;

    /// Number of slots that could be claimed right now
    fn remaining_capacity(&self) -> i64;

    /// Claim the next sequence, blocking while the buffer is full
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim the next `n` sequences, blocking while the buffer is full
    ///
    /// # Returns
    /// The highest claimed sequence; the claim is `hi - (n - 1)..=hi`
    ///
    /// # Errors
    /// `InvalidClaimSize` if `n` is not in `1..=buffer_size`
    fn next_n(&self, n: i64) -> Result<i64>;

    /// Claim the next sequence without blocking
    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim the next `n` sequences without blocking
    ///
    /// # Errors
    /// `InsufficientCapacity` if the gating consumers have not freed `n` slots,
    /// `InvalidClaimSize` if `n` is not in `1..=buffer_size`
    fn try_next_n(&self, n: i64) -> Result<i64>;

    /// Publish a single claimed sequence and wake blocked consumers
    fn publish(&self, sequence: i64);

    /// Publish a claimed range (inclusive) and wake blocked consumers
    fn publish_range(&self, low: i64, high: i64);

    /// Whether `sequence` has been published and is still in the buffer
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `next_sequence..=available_sequence` such that every
    /// sequence from `next_sequence` up to it has been published
    ///
    /// Returns `next_sequence - 1` when `next_sequence` itself is not yet published.
    fn highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64;

    /// Add consumer sequences that producers must not overtake
    ///
    /// Added sequences are moved to the current cursor.
    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]);

    /// Remove a gating sequence; returns whether it was registered
    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool;

    /// Minimum over the gating sequences, or the cursor when there are none
    fn minimum_sequence(&self) -> i64;
}

/// State shared by both sequencer flavours
#[derive(Debug)]
struct SequencerCore {
    buffer_size: i64,
    wait_strategy: Arc<dyn WaitStrategy>,
    cursor: Arc<Sequence>,
    gating_sequences: RwLock<Vec<Arc<Sequence>>>,
}

impl SequencerCore {
    fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        if !crate::disruptor::is_power_of_two(buffer_size) {
            return Err(DisruptorError::InvalidBufferSize(buffer_size));
        }

        Ok(Self {
            buffer_size: buffer_size as i64,
            wait_strategy,
            cursor: Arc::new(Sequence::new(INITIAL_CURSOR_VALUE)),
            gating_sequences: RwLock::new(Vec::new()),
        })
    }

    fn check_claim_size(&self, n: i64) -> Result<()> {
        if n < 1 || n > self.buffer_size {
            return Err(DisruptorError::InvalidClaimSize {
                requested: n,
                buffer_size: self.buffer_size,
            });
        }
        Ok(())
    }

    fn minimum_gating_sequence(&self, default: i64) -> i64 {
        get_minimum_sequence(&self.gating_sequences.read(), default)
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        let mut sequences = self.gating_sequences.write();
        let cursor = self.cursor.get();
        for sequence in gating_sequences {
            sequence.set(cursor);
            sequences.push(Arc::clone(sequence));
        }
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut sequences = self.gating_sequences.write();
        let before = sequences.len();
        sequences.retain(|s| !Arc::ptr_eq(s, sequence));
        sequences.len() != before
    }
}

/// Single producer sequencer
///
/// Not safe for concurrent publishers: the caller guarantees that only one thread
/// claims and publishes. Claim bookkeeping is therefore plain (relaxed) state, and
/// the cursor only moves on publish, so cursor order is write order.
#[derive(Debug)]
pub struct SingleProducerSequencer {
    core: SequencerCore,
    /// Highest claimed sequence, owned by the producer thread
    next_value: CachePadded<AtomicI64>,
    /// Last observed minimum gating sequence
    cached_value: CachePadded<AtomicI64>,
}

impl SingleProducerSequencer {
    /// Create a new single producer sequencer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of 2
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        Ok(Self {
            core: SequencerCore::new(buffer_size, wait_strategy)?,
            next_value: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            cached_value: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
        })
    }

    fn has_capacity(&self, required_capacity: i64, do_store: bool) -> bool {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let wrap_point = (next_value + required_capacity) - self.core.buffer_size;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            if do_store {
                fence(Ordering::SeqCst);
            }

            let min_sequence = self.core.minimum_gating_sequence(next_value);
            self.cached_value.store(min_sequence, Ordering::Relaxed);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for SingleProducerSequencer {
    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.core.cursor)
    }

    fn buffer_size(&self) -> i64 {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.core.wait_strategy)
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.has_capacity(required_capacity, false)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.load(Ordering::Relaxed);
        let consumed = self.core.minimum_gating_sequence(next_value);
        self.core.buffer_size - (next_value - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        self.core.check_claim_size(n)?;

        let next_value = self.next_value.load(Ordering::Relaxed);
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.core.buffer_size;
        let cached_gating_sequence = self.cached_value.load(Ordering::Relaxed);

        if wrap_point > cached_gating_sequence || cached_gating_sequence > next_value {
            fence(Ordering::SeqCst);

            let mut min_sequence = self.core.minimum_gating_sequence(next_value);
            if wrap_point > min_sequence {
                tracing::trace!(wrap_point, min_sequence, "producer waiting for capacity");
            }
            while wrap_point > min_sequence {
                thread::yield_now();
                min_sequence = self.core.minimum_gating_sequence(next_value);
            }

            self.cached_value.store(min_sequence, Ordering::Relaxed);
        }

        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        self.core.check_claim_size(n)?;

        if !self.has_capacity(n, true) {
            return Err(DisruptorError::InsufficientCapacity);
        }

        let next_sequence = self.next_value.load(Ordering::Relaxed) + n;
        self.next_value.store(next_sequence, Ordering::Relaxed);
        Ok(next_sequence)
    }

    fn publish(&self, sequence: i64) {
        self.core.cursor.set(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, _low: i64, high: i64) {
        self.publish(high);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let current = self.core.cursor.get();
        sequence <= current && sequence > current - self.core.buffer_size
    }

    fn highest_published_sequence(&self, _next_sequence: i64, available_sequence: i64) -> i64 {
        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core.add_gating_sequences(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.remove_gating_sequence(sequence)
    }

    fn minimum_sequence(&self) -> i64 {
        self.core.minimum_gating_sequence(self.core.cursor.get())
    }
}

/// Multi producer sequencer
///
/// Safe for concurrent publishers. Claims are made with a CAS on the cursor, so
/// the cursor is the highest *claimed* sequence. Producers can finish writing out
/// of claim order, so each publish flips a per-slot availability marker to the
/// lap number of the sequence (`sequence >> log2(buffer_size)`); consumers find
/// the contiguous published range with
/// [`Sequencer::highest_published_sequence`].
#[derive(Debug)]
pub struct MultiProducerSequencer {
    core: SequencerCore,
    /// Last observed minimum gating sequence, shared between producers
    gating_sequence_cache: Sequence,
    /// Lap marker per slot; -1 until first published
    available_buffer: Box<[AtomicI32]>,
    index_mask: i64,
    index_shift: u32,
}

impl MultiProducerSequencer {
    /// Create a new multi producer sequencer
    ///
    /// # Errors
    /// Returns `DisruptorError::InvalidBufferSize` if `buffer_size` is not a power of 2
    pub fn new(buffer_size: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Result<Self> {
        let core = SequencerCore::new(buffer_size, wait_strategy)?;

        let available_buffer: Box<[AtomicI32]> =
            (0..buffer_size).map(|_| AtomicI32::new(-1)).collect();

        Ok(Self {
            core,
            gating_sequence_cache: Sequence::new(INITIAL_CURSOR_VALUE),
            available_buffer,
            index_mask: buffer_size as i64 - 1,
            index_shift: buffer_size.trailing_zeros(),
        })
    }

    #[inline]
    fn calculate_index(&self, sequence: i64) -> usize {
        (sequence & self.index_mask) as usize
    }

    #[inline]
    fn calculate_availability_flag(&self, sequence: i64) -> i32 {
        (sequence >> self.index_shift) as i32
    }

    /// Release store: the slot write happens-before any acquire read of the marker
    #[inline]
    fn set_available(&self, sequence: i64) {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].store(flag, Ordering::Release);
    }

    fn has_capacity(&self, required_capacity: i64, cursor_value: i64) -> bool {
        let wrap_point = (cursor_value + required_capacity) - self.core.buffer_size;
        let cached_gating_sequence = self.gating_sequence_cache.get();

        if wrap_point > cached_gating_sequence || cached_gating_sequence > cursor_value {
            let min_sequence = self.core.minimum_gating_sequence(cursor_value);
            self.gating_sequence_cache.set(min_sequence);

            if wrap_point > min_sequence {
                return false;
            }
        }

        true
    }
}

impl Sequencer for MultiProducerSequencer {
    fn cursor(&self) -> Arc<Sequence> {
        Arc::clone(&self.core.cursor)
    }

    fn buffer_size(&self) -> i64 {
        self.core.buffer_size
    }

    fn wait_strategy(&self) -> Arc<dyn WaitStrategy> {
        Arc::clone(&self.core.wait_strategy)
    }

    fn has_available_capacity(&self, required_capacity: i64) -> bool {
        self.has_capacity(required_capacity, self.core.cursor.get())
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.core.cursor.get();
        let consumed = self.core.minimum_gating_sequence(produced);
        self.core.buffer_size - (produced - consumed)
    }

    fn next_n(&self, n: i64) -> Result<i64> {
        self.core.check_claim_size(n)?;

        loop {
            let current = self.core.cursor.get();
            let next_sequence = current + n;
            let wrap_point = next_sequence - self.core.buffer_size;
            let cached_gating_sequence = self.gating_sequence_cache.get();

            if wrap_point > cached_gating_sequence || cached_gating_sequence > current {
                let gating_sequence = self.core.minimum_gating_sequence(current);

                if wrap_point > gating_sequence {
                    thread::yield_now();
                    continue;
                }

                self.gating_sequence_cache.set(gating_sequence);
            } else if self.core.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
        }
    }

    fn try_next_n(&self, n: i64) -> Result<i64> {
        self.core.check_claim_size(n)?;

        loop {
            let current = self.core.cursor.get();
            let next_sequence = current + n;

            if !self.has_capacity(n, current) {
                return Err(DisruptorError::InsufficientCapacity);
            }

            if self.core.cursor.compare_and_set(current, next_sequence) {
                return Ok(next_sequence);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn publish_range(&self, low: i64, high: i64) {
        for sequence in low..=high {
            self.set_available(sequence);
        }
        self.core.wait_strategy.signal_all_when_blocking();
    }

    fn is_available(&self, sequence: i64) -> bool {
        let index = self.calculate_index(sequence);
        let flag = self.calculate_availability_flag(sequence);
        self.available_buffer[index].load(Ordering::Acquire) == flag
    }

    fn highest_published_sequence(&self, next_sequence: i64, available_sequence: i64) -> i64 {
        for sequence in next_sequence..=available_sequence {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }

        available_sequence
    }

    fn add_gating_sequences(&self, gating_sequences: &[Arc<Sequence>]) {
        self.core.add_gating_sequences(gating_sequences);
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core.remove_gating_sequence(sequence)
    }

    fn minimum_sequence(&self) -> i64 {
        self.core.minimum_gating_sequence(self.core.cursor.get())
    }
}
